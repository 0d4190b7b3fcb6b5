use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CaptureError, Result};

/// Size in bytes of one complex sample (f32 I + f32 Q).
pub const COMPLEX_SIZE: usize = 8;

/// How a full buffer is persisted relative to the streaming task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Persist on the streaming task; the stream stalls until it finishes.
    Inline,
    /// Hand the buffer to a background worker and keep streaming.
    #[default]
    Background,
}

/// What happens to the capture flag once a buffer fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Clear the flag before persisting; one capture per start.
    #[default]
    OneShot,
    /// Leave the flag alone and keep filling fresh buffers until stopped.
    Continuous,
}

/// Reaction to a failed record-store insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordFailurePolicy {
    /// Abort stream processing
    #[default]
    Abort,
    /// Log and keep streaming; the capture file stays orphaned on disk
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriggerConfig {
    /// Power threshold (I² + Q²)
    #[serde(default)]
    pub level: f32,
}

/// Construction-time configuration for the capture pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_item_size")]
    pub item_size: usize,

    /// Capture buffer capacity in items
    pub chunk_size: usize,

    /// Informational only
    #[serde(default)]
    pub samp_rate: u64,

    pub capture_dir: PathBuf,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_store_collection")]
    pub store_collection: String,

    #[serde(default)]
    pub event_url: Option<String>,

    /// Seconds added to the capture timestamp
    #[serde(default)]
    pub time_offset: i64,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default)]
    pub persist_mode: PersistMode,

    #[serde(default)]
    pub capture_mode: CaptureMode,

    #[serde(default = "default_max_pending")]
    pub max_pending_captures: usize,

    #[serde(default)]
    pub record_failure: RecordFailurePolicy,

    /// Directory holding file-backed control flags; anonymous flags when unset
    #[serde(default)]
    pub flag_dir: Option<PathBuf>,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub event_template: Option<Value>,
}

fn default_item_size() -> usize {
    COMPLEX_SIZE
}

fn default_store_path() -> PathBuf {
    PathBuf::from("iqcapture.sqlite")
}

fn default_store_collection() -> String {
    "data_messages".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_max_pending() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    100
}

impl CaptureConfig {
    /// Minimal config with every optional field at its default.
    pub fn new(chunk_size: usize, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            item_size: default_item_size(),
            chunk_size,
            samp_rate: 0,
            capture_dir: capture_dir.into(),
            store_path: default_store_path(),
            store_collection: default_store_collection(),
            event_url: None,
            time_offset: 0,
            verify_tls: true,
            http_timeout_ms: default_http_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            persist_mode: PersistMode::default(),
            capture_mode: CaptureMode::default(),
            max_pending_captures: default_max_pending(),
            record_failure: RecordFailurePolicy::default(),
            flag_dir: None,
            channel_capacity: default_channel_capacity(),
            trigger: TriggerConfig::default(),
            event_template: None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| CaptureError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CaptureError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| CaptureError::Configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_value(value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.item_size == 0 || self.item_size % COMPLEX_SIZE != 0 {
            return Err(CaptureError::Configuration(format!(
                "item_size {} is not a positive multiple of {}",
                self.item_size, COMPLEX_SIZE
            )));
        }
        if self.chunk_size == 0 {
            return Err(CaptureError::Configuration("chunk_size must be > 0".into()));
        }
        if self.capture_dir.as_os_str().is_empty() {
            return Err(CaptureError::Configuration("capture_dir is empty".into()));
        }
        let collection_ok = !self.store_collection.is_empty()
            && self
                .store_collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !collection_ok {
            return Err(CaptureError::Configuration(format!(
                "store_collection {:?} must be a plain identifier",
                self.store_collection
            )));
        }
        if self.max_pending_captures == 0 {
            return Err(CaptureError::Configuration("max_pending_captures must be > 0".into()));
        }
        if self.channel_capacity == 0 {
            return Err(CaptureError::Configuration("channel_capacity must be > 0".into()));
        }
        if let Some(template) = &self.event_template {
            if !template.is_object() {
                return Err(CaptureError::Configuration("event_template must be an object".into()));
            }
        }
        Ok(())
    }

    /// Complex values per item.
    pub fn vector_len(&self) -> usize {
        self.item_size / COMPLEX_SIZE
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
