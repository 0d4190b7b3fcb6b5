use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Capture pipeline lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Initializing,
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
    },
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
        total_frames: u64,
    },
    /// Stream processing aborted
    Error {
        error_msg: String,
    },
}

impl PipelineState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Initializing) |
            (Initializing, Running { .. }) |
            (Initializing, Error { .. }) |
            (Running { .. }, Completed { .. }) |
            (Running { .. }, Error { .. }) |
            (Completed { .. }, Idle) |
            (Error { .. }, Idle)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing => "Initializing",
            Self::Running { .. } => "Running",
            Self::Completed { .. } => "Completed",
            Self::Error { .. } => "Error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}
