use std::path::PathBuf;
use thiserror::Error;

use crate::config::RecordFailurePolicy;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Failures raised by the capture path.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Bad configuration or an unreachable record store at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Event template was not a JSON object.
    #[error("invalid event template: {0}")]
    InvalidTemplate(String),

    /// Every `capture-<ts>` candidate in the capture root is taken.
    #[error("no free capture name for {}", base.display())]
    DestinationNameExhausted { base: PathBuf },

    #[error("failed to write capture {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event publish failed: {0}")]
    RemotePublish(String),

    #[error("record store insert failed: {0}")]
    LocalInsert(String),

    /// Background persistence queue is full; the capture was dropped.
    #[error("persist queue full, capture dropped")]
    PersistBacklog,

    #[error("stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether this error must abort stream processing.
    pub fn is_fatal(&self, record_failure: RecordFailurePolicy) -> bool {
        match self {
            CaptureError::RemotePublish(_)
            | CaptureError::PersistBacklog
            | CaptureError::InvalidTemplate(_) => false,
            CaptureError::LocalInsert(_) => record_failure == RecordFailurePolicy::Abort,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!CaptureError::RemotePublish("503".into()).is_fatal(RecordFailurePolicy::Abort));
        assert!(!CaptureError::PersistBacklog.is_fatal(RecordFailurePolicy::Abort));
        assert!(CaptureError::LocalInsert("locked".into()).is_fatal(RecordFailurePolicy::Abort));
        assert!(
            !CaptureError::LocalInsert("locked".into()).is_fatal(RecordFailurePolicy::Continue)
        );
        assert!(CaptureError::DestinationNameExhausted { base: "/tmp/capture-1".into() }
            .is_fatal(RecordFailurePolicy::Continue));
    }
}
