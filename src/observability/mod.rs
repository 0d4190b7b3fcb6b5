pub mod metrics;

pub use metrics::{CaptureMetrics, CaptureSnapshot, NodeMetrics, NodeSnapshot};
