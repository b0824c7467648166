pub mod decimal;
pub mod decoders;
pub mod envelope;

pub use decimal::DecodeError;
pub use envelope::{CdcEnvelope, EnvelopeError, Operation, RowSnapshot};
