use cdc_stage::datasource::kafka::ConnectionOpts;
use cdc_stage::prelude::*;
use tracing_subscriber::{fmt::format::FmtSpan, FmtSubscriber};

/// Stages one batch of product changes from the Debezium topic and prints the load command
/// for it.
///
/// Run `emit_products` first, or point `bootstrap_servers` at a cluster with a running
/// connector for the `inventory.products` table.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().expect("Failed to set up log tracer");

    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_span_events(FmtSpan::CLOSE)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let bootstrap_servers = String::from("localhost:9092");
    let source = KafkaSourceBuilder::new(bootstrap_servers)
        .with_topic(String::from("inventory.inventory.products"))
        .with_group_id(String::from("airflow-kafka-group"))
        .with_commit_policy(CommitPolicy::AfterStage)
        .build_source(ConnectionOpts::from([(
            "session.timeout.ms".to_string(),
            "10000".to_string(),
        )]))?;

    let config = PipelineConfig::builder()
        .with_batch_size(10)
        .with_artifact_prefix("products")
        .build()?;

    let mut pipeline = Pipeline::new(source, config);
    match pipeline.run().await? {
        RunOutcome::NoWork { run_id } => {
            println!("run {run_id}: no messages consumed");
        }
        RunOutcome::Staged { artifact, report } => {
            println!(
                "run {}: {} of {} events staged ({} skipped)",
                artifact.run_id(),
                report.records,
                report.envelopes,
                report.skipped()
            );
            let load = LoadRequest::new("data_warehouse.products_cdc", &artifact);
            println!("bq {}", load.bq_args().join(" "));
        }
    }

    Ok(())
}
