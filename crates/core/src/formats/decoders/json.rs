use serde_json::Value;

use super::Decoder;
use crate::formats::envelope::{CdcEnvelope, EnvelopeError};

/// Decodes Debezium JSON messages.
///
/// Handles both converter layouts: with schemas enabled the envelope sits under a top-level
/// `payload` key next to `schema`; with schemas disabled the message is the envelope itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder {}

impl JsonDecoder {
    pub fn new() -> Self {
        JsonDecoder {}
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Option<CdcEnvelope>, EnvelopeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let mut value: Value = serde_json::from_slice(payload)?;
        if let Some(inner) = value.as_object_mut().and_then(|obj| obj.remove("payload")) {
            value = inner;
        }
        match value {
            Value::Null => Ok(None),
            value => CdcEnvelope::from_value(value).map(Some),
        }
    }
}
