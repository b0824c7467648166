//! Debezium change event envelopes.
//!
//! Only the parts of the envelope the pipeline consults are modelled: the operation code and
//! the `before`/`after` row images. Everything else (`source`, `transaction`, ...) is ignored.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field name to value, in the order the connector emitted them.
pub type RowSnapshot = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum Operation {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
    /// Emitted while the connector snapshots existing rows.
    #[serde(rename = "r")]
    Read,
    /// Truncates, logical messages, or anything else this pipeline does not stage.
    #[default]
    #[serde(other)]
    Unsupported,
}

impl Operation {
    /// Create, update and delete are the only operations that produce records.
    pub fn is_row_change(self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CdcEnvelope {
    #[serde(rename = "op", default, deserialize_with = "operation_or_unsupported")]
    pub operation: Operation,
    #[serde(default)]
    pub before: Option<RowSnapshot>,
    #[serde(default)]
    pub after: Option<RowSnapshot>,
    #[serde(default)]
    pub ts_ms: Option<i64>,
}

impl CdcEnvelope {
    pub fn new(
        operation: Operation,
        before: Option<RowSnapshot>,
        after: Option<RowSnapshot>,
    ) -> Self {
        Self {
            operation,
            before,
            after,
            ts_ms: None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject(json_type_name(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The row image the operation refers to: `after` for creates and updates, `before` for
    /// deletes. Other operations have none.
    pub fn snapshot(&self) -> Option<&RowSnapshot> {
        match self.operation {
            Operation::Create | Operation::Update => self.after.as_ref(),
            Operation::Delete => self.before.as_ref(),
            Operation::Read | Operation::Unsupported => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an envelope object, got {0}")]
    NotAnObject(&'static str),
}

fn operation_or_unsupported<'de, D>(deserializer: D) -> Result<Operation, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Operation>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
