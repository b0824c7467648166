pub mod channel_manager;
pub mod orchestrator;
pub mod sensor;

pub use channel_manager::{create_channel, HandoffReceiver, HandoffSender};
pub use orchestrator::{OrchestrationMessage, Orchestrator, PipelineState, StateHandle};
pub use sensor::{Sensor, SensorOutcome};
