use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::capture::SharedTemplate;
use crate::core::SharedFlag;
use crate::error::{CaptureError, Result};

pub const CAPTURE_FLAG_FILE: &str = "capture.flag";
pub const ARMED_FLAG_FILE: &str = "armed.flag";

/// Capture and armed flags, file-backed under `flag_dir` when given.
pub fn open_flags(flag_dir: Option<&Path>) -> Result<(SharedFlag, SharedFlag)> {
    match flag_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                CaptureError::Configuration(format!(
                    "cannot create flag dir {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            Ok((
                SharedFlag::open(dir.join(CAPTURE_FLAG_FILE))?,
                SharedFlag::open(dir.join(ARMED_FLAG_FILE))?,
            ))
        }
        None => Ok((SharedFlag::anonymous()?, SharedFlag::anonymous()?)),
    }
}

/// Control surface for a running capture chain. Cheap to clone and safe to
/// use from any thread.
#[derive(Debug, Clone)]
pub struct CaptureControls {
    capture: SharedFlag,
    armed: SharedFlag,
    template: SharedTemplate,
}

impl CaptureControls {
    pub fn new(capture: SharedFlag, armed: SharedFlag, template: SharedTemplate) -> Self {
        Self {
            capture,
            armed,
            template,
        }
    }

    /// Attach to the file-backed flags of a pipeline running in another
    /// process. Templates set through the result stay local.
    pub fn attach(flag_dir: impl Into<PathBuf>) -> Result<Self> {
        let flag_dir = flag_dir.into();
        let (capture, armed) = open_flags(Some(&flag_dir))?;
        Ok(Self::new(capture, armed, SharedTemplate::default()))
    }

    pub fn start_capture(&self) {
        self.capture.set();
    }

    pub fn stop_capture(&self) {
        self.capture.clear();
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_set()
    }

    pub fn arm(&self) {
        self.armed.set();
    }

    pub fn disarm(&self) {
        self.armed.clear();
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_set()
    }

    pub fn set_event_template(&self, text: &str) -> Result<()> {
        self.template.set_json(text)
    }

    pub fn set_event_template_value(&self, value: Value) -> Result<()> {
        self.template.set_value(value)
    }
}
