use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{CaptureError, Result};

/// Capture timestamp, computed at persist time
pub const TIMESTAMP_FIELD: &str = "t";
pub const SAMPLE_COUNT_FIELD: &str = "SampleCount";
/// Local file name; only ever stored locally
pub const CAPTURE_FILE_FIELD: &str = "_capture_file";

/// Operator-supplied metadata attached to every capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTemplate {
    fields: Map<String, Value>,
}

impl EventTemplate {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CaptureError::InvalidTemplate(e.to_string()))?;
        Self::from_value(value)
    }

    /// Accepts a JSON object; any `t` field is dropped.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut fields) => {
                fields.remove(TIMESTAMP_FIELD);
                Ok(Self { fields })
            }
            other => Err(CaptureError::InvalidTemplate(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Template slot shared between the control surface and the streaming task.
///
/// Replaced wholesale on update; the streaming task only clones it when a
/// buffer fills.
#[derive(Debug, Clone, Default)]
pub struct SharedTemplate {
    inner: Arc<Mutex<EventTemplate>>,
}

impl SharedTemplate {
    pub fn new(template: EventTemplate) -> Self {
        Self {
            inner: Arc::new(Mutex::new(template)),
        }
    }

    /// Parse and install a template. The previous one is kept on error.
    pub fn set_json(&self, text: &str) -> Result<()> {
        let template = EventTemplate::parse(text)?;
        self.replace(template);
        Ok(())
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        let template = EventTemplate::from_value(value)?;
        self.replace(template);
        Ok(())
    }

    pub fn replace(&self, template: EventTemplate) {
        let mut slot = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = template;
    }

    pub fn snapshot(&self) -> EventTemplate {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Event published to the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EventRecord {
    fields: Map<String, Value>,
}

impl EventRecord {
    /// Template plus `t` and `SampleCount`.
    pub fn build(template: &EventTemplate, timestamp: i64, sample_count: usize) -> Self {
        let mut fields = template.fields.clone();
        fields.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp));
        fields.insert(SAMPLE_COUNT_FIELD.to_string(), Value::from(sample_count as u64));
        Self { fields }
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    pub fn sample_count(&self) -> Option<u64> {
        self.fields.get(SAMPLE_COUNT_FIELD).and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    /// Copy for the local record store, tagged with the capture file.
    pub fn for_store(&self, capture_file: &Path) -> StoreRecord {
        let capture_file = capture_file.display().to_string();
        let mut fields = self.fields.clone();
        fields.insert(CAPTURE_FILE_FIELD.to_string(), Value::from(capture_file.clone()));
        StoreRecord {
            fields,
            capture_file,
        }
    }
}

/// Event inserted into the local record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreRecord {
    #[serde(flatten)]
    fields: Map<String, Value>,

    #[serde(skip)]
    capture_file: String,
}

impl StoreRecord {
    pub fn capture_file(&self) -> &str {
        &self.capture_file
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    pub fn sample_count(&self) -> Option<u64> {
        self.fields.get(SAMPLE_COUNT_FIELD).and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}
