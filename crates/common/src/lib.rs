pub mod error;

pub use error::{CdcStageError, Result};
