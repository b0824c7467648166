pub mod row_encoder;
mod run_id;

pub use run_id::{generate_run_id, sanitize_prefix};
