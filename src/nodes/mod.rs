pub mod burst_source;
pub mod capture_sink;
pub mod level_trigger;

pub use burst_source::BurstSource;
pub use capture_sink::CaptureSink;
pub use level_trigger::{LevelTrigger, TriggerEvent};
