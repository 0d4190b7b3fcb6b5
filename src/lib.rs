pub mod buffers;
pub mod capture;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod nodes;
pub mod notify;
pub mod observability;

pub use config::CaptureConfig;
pub use error::{CaptureError, Result};
