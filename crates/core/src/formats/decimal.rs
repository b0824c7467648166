//! Encoded-decimal tokens.
//!
//! Fixed-point columns arrive as base64 text wrapping the decimal's textual form. Decoding
//! keeps full precision in a [`Decimal`]; the only lossy step is [`to_f64`], applied when the
//! value lands in the staged record.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::envelope::json_type_name;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded bytes are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("not a decimal: {0:?}")]
    NotNumeric(String),
    #[error("expected an encoded string, got {0}")]
    UnexpectedType(&'static str),
}

/// Decodes a token. A missing or null token is `Ok(None)`, never an error.
pub fn decode(token: Option<&Value>) -> Result<Option<Decimal>, DecodeError> {
    let encoded = match token {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(encoded)) => encoded,
        Some(other) => return Err(DecodeError::UnexpectedType(json_type_name(other))),
    };
    let bytes = STANDARD.decode(encoded.as_bytes())?;
    let text = String::from_utf8(bytes)?;
    parse_decimal(&text).map(Some)
}

/// Like [`decode`], but a failure is logged and treated as no value.
pub fn decode_or_null(token: Option<&Value>) -> Option<Decimal> {
    match decode(token) {
        Ok(value) => value,
        Err(err) => {
            warn!(?token, "Error decoding price: {}", err);
            None
        }
    }
}

pub fn encode(value: &Decimal) -> String {
    STANDARD.encode(value.to_string())
}

/// Nearest `f64` to the decimal, rounded from its canonical text.
pub fn to_f64(value: &Decimal) -> Option<f64> {
    value.to_string().parse().ok()
}

fn parse_decimal(text: &str) -> Result<Decimal, DecodeError> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| DecodeError::NotNumeric(trimmed.to_string()))
}
