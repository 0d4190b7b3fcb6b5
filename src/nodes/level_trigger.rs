use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::CaptureConfig;
use crate::core::{ProcessingNode, SampleFrame, SharedFlag};
use crate::error::Result;

/// Message published by a trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Begin capturing
    Start,
}

/// Pass-through node that fires a one-shot `Start` when an item's power
/// (I² + Q² of its first value) exceeds `level`.
///
/// Arming lasts for a single processing call: the node disarms itself after
/// scanning one frame whether or not the threshold was crossed.
pub struct LevelTrigger {
    name: String,
    level: f32,
    armed: SharedFlag,
    listeners: Vec<mpsc::Sender<TriggerEvent>>,
    /// Power levels are logged during the first armed scan only
    log_power: bool,
    items_seen: u64,
}

impl LevelTrigger {
    pub fn new(level: f32, armed: SharedFlag) -> Self {
        Self {
            name: "level_trigger".to_string(),
            level,
            armed,
            listeners: Vec::new(),
            log_power: true,
            items_seen: 0,
        }
    }

    pub fn from_config(config: &CaptureConfig, armed: SharedFlag) -> Self {
        Self::new(config.trigger.level, armed)
    }

    pub fn arm(&self) {
        self.armed.set();
        debug!("{}: armed at level {}", self.name, self.level);
    }

    pub fn disarm(&self) {
        self.armed.clear();
        debug!("{}: disarmed", self.name);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_set()
    }

    /// Flag an external controller can set to arm this trigger
    pub fn armed_flag(&self) -> SharedFlag {
        self.armed.clone()
    }

    pub fn connect(&mut self, listener: mpsc::Sender<TriggerEvent>) {
        self.listeners.push(listener);
    }

    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<TriggerEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.connect(tx);
        rx
    }

    /// Index of the first item whose power exceeds the level.
    fn find_crossing(&mut self, frame: &SampleFrame) -> Option<usize> {
        for (index, item) in frame.items().enumerate() {
            let power = item[0].norm_sqr();
            if power > self.level {
                return Some(index);
            }
            if self.log_power {
                debug!("{}: power level {}", self.name, power);
            }
        }
        None
    }

    fn publish(&mut self) {
        let name = &self.name;
        self.listeners.retain(|listener| match listener.try_send(TriggerEvent::Start) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("{}: listener queue full, start event dropped", name);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("{}: listener gone", name);
                false
            }
        });
    }
}

#[async_trait]
impl ProcessingNode for LevelTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&mut self, input: SampleFrame) -> Result<Option<SampleFrame>> {
        let first_item = self.items_seen;
        self.items_seen += input.item_count() as u64;

        if self.armed.is_set() {
            if let Some(index) = self.find_crossing(&input) {
                debug!(
                    "{}: level {} exceeded at item {}",
                    self.name,
                    self.level,
                    first_item + index as u64
                );
                self.publish();
            }
            self.disarm();
            self.log_power = false;
        }

        Ok(Some(input))
    }
}
