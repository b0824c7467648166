pub mod kafka_config;
pub mod kafka_source;
pub mod offsets;

pub use kafka_config::{ConnectionOpts, KafkaReadConfig, KafkaSourceBuilder};
pub use kafka_source::KafkaSource;
pub use offsets::OffsetTracker;
