use cdc_stage::formats::decimal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A row of the `inventory.products` table as Debezium captures it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Base64 of the decimal text, the way the connector encodes NUMERIC columns.
    pub price: Option<String>,
}

impl Product {
    pub fn new(id: i64, name: &str, description: Option<&str>, price: Option<Decimal>) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            price: price.as_ref().map(decimal::encode),
        }
    }
}

/// Builds a full Debezium message, `schema` and `payload`, for one row change.
pub fn change_event(op: &str, before: Option<&Product>, after: Option<&Product>) -> Value {
    json!({
        "schema": {"type": "struct", "name": "inventory.inventory.products.Envelope"},
        "payload": {
            "op": op,
            "before": before,
            "after": after,
            "source": {"db": "inventory", "table": "products"},
            "ts_ms": 1_715_201_766_763_i64,
        }
    })
}

pub fn get_sample_event() -> Value {
    let widget = Product::new(1, "Widget", Some("A widget"), Some(Decimal::new(1999, 2)));
    change_event("c", None, Some(&widget))
}
