use std::time::Duration;

use cdc_stage::formats::decimal;
use cdc_stage_demos::{change_event, Product};
use rand::seq::SliceRandom;
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rust_decimal::Decimal;

/// This script emits Debezium-style change events for a small product catalog
///
/// To run start kafka in docker run `docker run -p 9092:9092 --name kafka apache/kafka`
/// Events are written to `inventory.inventory.products` and read by `debezium_to_staging`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", String::from("localhost:9092"))
        .set("message.timeout.ms", "5000")
        .create()
        .expect("Producer creation error");

    let names = ["Widget", "Gadget", "Sprocket", "Gizmo", "Doohickey"];
    let mut catalog: Vec<Product> = Vec::new();

    for _ in 0..200 {
        let (op, before, after) = {
            let mut rng = rand::thread_rng();
            let roll: f64 = rng.gen();
            if catalog.is_empty() || roll < 0.5 {
                let id = catalog.len() as i64 + 1;
                let name = names.choose(&mut rng).unwrap();
                let price = Decimal::new(rng.gen_range(100..100_000), 2);
                let product = Product::new(id, name, Some("generated"), Some(price));
                catalog.push(product.clone());
                ("c", None, Some(product))
            } else if roll < 0.9 {
                let idx = rng.gen_range(0..catalog.len());
                let before = catalog[idx].clone();
                let price = Decimal::new(rng.gen_range(100..100_000), 2);
                catalog[idx].price = Some(decimal::encode(&price));
                ("u", Some(before), Some(catalog[idx].clone()))
            } else {
                let idx = rng.gen_range(0..catalog.len());
                ("d", Some(catalog.swap_remove(idx)), None)
            }
        };

        let msg = serde_json::to_vec(&change_event(op, before.as_ref(), after.as_ref()))?;
        let _ = producer
            .send(
                FutureRecord::<(), Vec<u8>>::to("inventory.inventory.products").payload(&msg),
                Duration::from_secs(5),
            )
            .await
            .map_err(|(err, _)| err)?;

        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Ok(())
}
