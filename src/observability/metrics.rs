use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::CaptureError;

/// Per-node throughput and latency counters.
pub struct NodeMetrics {
    node_id: String,
    frames_processed: AtomicU64,
    items_processed: AtomicU64,
    errors_count: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl NodeMetrics {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            frames_processed: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn record_frame_processed(&self, items: usize) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.items_processed.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_processing(&self) -> Instant {
        Instant::now()
    }

    pub fn finish_processing(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node_id: self.node_id.clone(),
            frames_processed: self.frames_processed(),
            items_processed: self.items_processed(),
            errors_count: self.errors_count(),
            avg_latency_us: self.avg_latency_us(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub frames_processed: u64,
    pub items_processed: u64,
    pub errors_count: u64,
    pub avg_latency_us: u64,
}

/// Outcome counters for capture cycles.
#[derive(Default)]
pub struct CaptureMetrics {
    captures_started: AtomicU64,
    captures_persisted: AtomicU64,
    captures_dropped: AtomicU64,
    storage_failures: AtomicU64,
    publish_failures: AtomicU64,
    insert_failures: AtomicU64,
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_capture_started(&self) {
        self.captures_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_persisted(&self) {
        self.captures_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed cycle under its error class
    pub fn record_failure(&self, error: &CaptureError) {
        let counter = match error {
            CaptureError::PersistBacklog => &self.captures_dropped,
            CaptureError::RemotePublish(_) => &self.publish_failures,
            CaptureError::LocalInsert(_) => &self.insert_failures,
            _ => &self.storage_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            captures_started: self.captures_started.load(Ordering::Relaxed),
            captures_persisted: self.captures_persisted.load(Ordering::Relaxed),
            captures_dropped: self.captures_dropped.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            insert_failures: self.insert_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub captures_started: u64,
    pub captures_persisted: u64,
    pub captures_dropped: u64,
    pub storage_failures: u64,
    pub publish_failures: u64,
    pub insert_failures: u64,
}
