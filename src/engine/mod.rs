pub mod controls;
pub mod pipeline;
pub mod state;

pub use controls::{open_flags, CaptureControls, ARMED_FLAG_FILE, CAPTURE_FLAG_FILE};
pub use pipeline::CapturePipeline;
pub use state::PipelineState;
