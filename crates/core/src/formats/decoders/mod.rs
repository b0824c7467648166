use super::envelope::{CdcEnvelope, EnvelopeError};

/// Turns a raw message payload from the source log into an envelope.
///
/// `Ok(None)` means the message carries no change event (a tombstone) and is skipped
/// without a diagnostic.
pub trait Decoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Option<CdcEnvelope>, EnvelopeError>;
}

pub mod json;

pub use json::JsonDecoder;
