use async_trait::async_trait;
use log::{debug, error, info, warn};
use num_complex::Complex32;
use std::path::{Path, PathBuf};

use super::naming::claim_capture_file;
use super::record::{EventRecord, EventTemplate};
use super::storage::write_capture;
use crate::buffers::PooledSamples;
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::notify::{
    EventPublisher, HttpPublisher, PublisherOptions, RecordStore, SqliteRecordStore,
};

/// A full capture buffer with the template that was current when it filled.
#[derive(Debug)]
pub struct CaptureBlock {
    samples: PooledSamples,
    item_count: usize,
    template: EventTemplate,
    captured_at: i64,
}

impl CaptureBlock {
    /// `captured_at` is the unix time in seconds at which the buffer filled.
    pub fn new(
        samples: PooledSamples,
        item_count: usize,
        template: EventTemplate,
        captured_at: i64,
    ) -> Self {
        Self {
            samples,
            item_count,
            template,
            captured_at,
        }
    }

    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }

    /// Items in the block (the configured chunk size)
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn template(&self) -> &EventTemplate {
        &self.template
    }

    pub fn captured_at(&self) -> i64 {
        self.captured_at
    }

    pub fn into_samples(self) -> PooledSamples {
        self.samples
    }
}

/// Result of one completed persist cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub destination: PathBuf,
    /// `t` as recorded, offset applied
    pub timestamp: i64,
    pub sample_count: usize,
    pub bytes_written: u64,
    /// False when no endpoint is configured or the POST failed
    pub published: bool,
    pub publish_error: Option<String>,
}

/// Persist-and-notify for one full buffer.
#[async_trait]
pub trait CapturePersist: Send + Sync {
    async fn persist(&self, block: &CaptureBlock) -> Result<PersistReport>;
}

/// Writes the capture file, publishes the event and records it locally.
pub struct Persister {
    capture_root: PathBuf,
    time_offset: i64,
    publisher: Option<Box<dyn EventPublisher>>,
    store: Box<dyn RecordStore>,
}

impl Persister {
    pub fn new(
        capture_root: impl Into<PathBuf>,
        time_offset: i64,
        publisher: Option<Box<dyn EventPublisher>>,
        store: Box<dyn RecordStore>,
    ) -> Self {
        Self {
            capture_root: capture_root.into(),
            time_offset,
            publisher,
            store,
        }
    }

    /// Build the HTTP publisher and SQLite store described by `config`.
    ///
    /// Fails if the capture root cannot be created or the store cannot be opened.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.capture_dir).map_err(|e| {
            CaptureError::Configuration(format!(
                "cannot create capture dir {}: {}",
                config.capture_dir.display(),
                e
            ))
        })?;

        let publisher = match &config.event_url {
            Some(url) => {
                let http = HttpPublisher::new(
                    url.clone(),
                    PublisherOptions {
                        verify_tls: config.verify_tls,
                        timeout: config.http_timeout(),
                    },
                )?;
                Some(Box::new(http) as Box<dyn EventPublisher>)
            }
            None => None,
        };

        let store = SqliteRecordStore::open(
            &config.store_path,
            &config.store_collection,
            config.store_timeout(),
        )?;
        info!(
            "record store {} ({}) ready",
            config.store_path.display(),
            config.store_collection
        );

        Ok(Self::new(
            config.capture_dir.clone(),
            config.time_offset,
            publisher,
            Box::new(store),
        ))
    }

    pub fn capture_root(&self) -> &Path {
        &self.capture_root
    }

    /// Run the sequence as if the capture completed at `unix_ts`.
    pub async fn persist_at(&self, block: &CaptureBlock, unix_ts: i64) -> Result<PersistReport> {
        let (destination, file) = claim_capture_file(&self.capture_root, unix_ts).await?;
        info!("writing capture to {}", destination.display());

        let bytes_written = match write_capture(file, &destination, block.samples()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&destination).await {
                    warn!("cannot remove partial capture {}: {}", destination.display(), rm);
                }
                return Err(e);
            }
        };
        debug!("wrote {} bytes to {}", bytes_written, destination.display());

        let timestamp = unix_ts + self.time_offset;
        let record = EventRecord::build(block.template(), timestamp, block.item_count());

        let (published, publish_error) = match &self.publisher {
            Some(publisher) => match publisher.publish(&record).await {
                Ok(()) => (true, None),
                Err(e) => {
                    error!("event publish for {} failed: {}", destination.display(), e);
                    (false, Some(e.to_string()))
                }
            },
            None => (false, None),
        };

        let stored = record.for_store(&destination);
        if let Err(e) = self.store.insert(&stored).await {
            error!(
                "record insert for {} failed, file left on disk: {}",
                destination.display(),
                e
            );
            return Err(e);
        }

        Ok(PersistReport {
            destination,
            timestamp,
            sample_count: block.item_count(),
            bytes_written,
            published,
            publish_error,
        })
    }
}

#[async_trait]
impl CapturePersist for Persister {
    async fn persist(&self, block: &CaptureBlock) -> Result<PersistReport> {
        self.persist_at(block, block.captured_at()).await
    }
}
