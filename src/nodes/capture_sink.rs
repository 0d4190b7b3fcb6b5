use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::level_trigger::TriggerEvent;
use crate::buffers::{PooledSamples, SampleBufferPool};
use crate::capture::{
    CaptureBlock, CapturePersist, PersistReport, PersistWorker, Persister, SharedTemplate,
};
use crate::config::{CaptureConfig, CaptureMode, PersistMode, RecordFailurePolicy};
use crate::core::{ProcessingNode, SampleFrame, SharedFlag};
use crate::error::{CaptureError, Result};
use crate::observability::CaptureMetrics;

const CAPTURE_PORT_CAPACITY: usize = 16;

enum PersistTarget {
    Inline(Arc<dyn CapturePersist>),
    Background(PersistWorker),
}

/// Terminal node that fills a bounded buffer while its capture flag is set
/// and persists every full buffer.
pub struct CaptureSink {
    name: String,
    chunk_size: usize,
    vector_len: usize,
    capture_mode: CaptureMode,
    record_failure: RecordFailurePolicy,
    capture_flag: SharedFlag,
    template: SharedTemplate,
    port_tx: mpsc::Sender<TriggerEvent>,
    port_rx: mpsc::Receiver<TriggerEvent>,
    pool: SampleBufferPool,
    buffer: PooledSamples,
    item_count: usize,
    persist: PersistTarget,
    metrics: Arc<CaptureMetrics>,
}

impl CaptureSink {
    /// Background mode spawns the persist worker, so this must run inside a
    /// Tokio runtime.
    pub fn new(
        config: &CaptureConfig,
        capture_flag: SharedFlag,
        persister: Arc<dyn CapturePersist>,
    ) -> Self {
        let vector_len = config.vector_len();
        let pool = SampleBufferPool::new(config.chunk_size * vector_len);
        let buffer = pool.get();
        let (port_tx, port_rx) = mpsc::channel(CAPTURE_PORT_CAPACITY);

        let persist = match config.persist_mode {
            PersistMode::Inline => PersistTarget::Inline(persister),
            PersistMode::Background => {
                let worker = PersistWorker::spawn(persister, config.max_pending_captures);
                PersistTarget::Background(worker)
            }
        };

        debug!(
            "capture_sink: item_size = {} chunk_size = {} samp_rate = {} capture_dir = {}",
            config.item_size,
            config.chunk_size,
            config.samp_rate,
            config.capture_dir.display()
        );

        Self {
            name: "capture_sink".to_string(),
            chunk_size: config.chunk_size,
            vector_len,
            capture_mode: config.capture_mode,
            record_failure: config.record_failure,
            capture_flag,
            template: SharedTemplate::default(),
            port_tx,
            port_rx,
            pool,
            buffer,
            item_count: 0,
            persist,
            metrics: Arc::new(CaptureMetrics::new()),
        }
    }

    /// Sink wired to the file writer, HTTP publisher and record store from
    /// `config`. Fails if the record store cannot be opened.
    pub fn from_config(config: &CaptureConfig, capture_flag: SharedFlag) -> Result<Self> {
        config.validate()?;
        let persister = Persister::from_config(config)?;
        let sink = Self::new(config, capture_flag, Arc::new(persister));
        if let Some(template) = &config.event_template {
            sink.set_event_template_value(template.clone())?;
        }
        Ok(sink)
    }

    pub fn start_capture(&self) {
        debug!("{}: start_capture", self.name);
        self.capture_flag.set();
    }

    pub fn stop_capture(&self) {
        debug!("{}: stop_capture", self.name);
        self.capture_flag.clear();
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_flag.is_set()
    }

    pub fn capture_flag(&self) -> SharedFlag {
        self.capture_flag.clone()
    }

    /// Sender for asynchronous start requests; each message acts like
    /// `start_capture`.
    pub fn capture_port(&self) -> mpsc::Sender<TriggerEvent> {
        self.port_tx.clone()
    }

    pub fn set_event_template(&self, text: &str) -> Result<()> {
        self.template.set_json(text)
    }

    pub fn set_event_template_value(&self, value: Value) -> Result<()> {
        self.template.set_value(value)
    }

    pub fn template_handle(&self) -> SharedTemplate {
        self.template.clone()
    }

    /// Items accumulated toward the next capture
    pub fn buffered_items(&self) -> usize {
        self.item_count
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn metrics(&self) -> Arc<CaptureMetrics> {
        self.metrics.clone()
    }

    /// Wait for queued captures and report the first fatal outcome.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.item_count > 0 {
            debug!("{}: discarding {} partial items", self.name, self.item_count);
        }
        let outcomes = match &mut self.persist {
            PersistTarget::Background(worker) => worker.shutdown().await,
            PersistTarget::Inline(_) => Vec::new(),
        };
        self.handle_outcomes(outcomes)
    }

    fn drain_capture_port(&mut self) {
        while let Ok(event) = self.port_rx.try_recv() {
            match event {
                TriggerEvent::Start => {
                    debug!("{}: capture requested", self.name);
                    self.capture_flag.set();
                }
            }
        }
    }

    fn collect_outcomes(&mut self) -> Result<()> {
        let outcomes = match &mut self.persist {
            PersistTarget::Background(worker) => worker.try_outcomes(),
            PersistTarget::Inline(_) => return Ok(()),
        };
        self.handle_outcomes(outcomes)
    }

    fn handle_outcomes(&self, outcomes: Vec<Result<PersistReport>>) -> Result<()> {
        let mut fatal = None;
        for outcome in outcomes {
            if let Err(e) = self.handle_outcome(outcome) {
                fatal.get_or_insert(e);
            }
        }
        fatal.map_or(Ok(()), Err)
    }

    fn handle_outcome(&self, outcome: Result<PersistReport>) -> Result<()> {
        match outcome {
            Ok(report) => {
                self.metrics.record_capture_persisted();
                if report.publish_error.is_some() {
                    self.metrics.record_publish_failure();
                }
                info!(
                    "{}: captured {} items to {}",
                    self.name,
                    report.sample_count,
                    report.destination.display()
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                if e.is_fatal(self.record_failure) {
                    error!("{}: capture failed: {}", self.name, e);
                    Err(e)
                } else {
                    warn!("{}: capture incomplete: {}", self.name, e);
                    Ok(())
                }
            }
        }
    }

    /// Returns whether more items may be accepted in this call.
    async fn handle_full_buffer(&mut self) -> Result<bool> {
        let keep_accepting = match self.capture_mode {
            CaptureMode::OneShot => {
                self.capture_flag.clear();
                false
            }
            CaptureMode::Continuous => true,
        };
        self.persist_buffer().await?;
        Ok(keep_accepting)
    }

    async fn persist_buffer(&mut self) -> Result<()> {
        let samples = std::mem::replace(&mut self.buffer, self.pool.get());
        let block = CaptureBlock::new(
            samples,
            self.item_count,
            self.template.snapshot(),
            chrono::Utc::now().timestamp(),
        );
        self.metrics.record_capture_started();

        let persister = match &self.persist {
            PersistTarget::Inline(persister) => persister.clone(),
            PersistTarget::Background(worker) => {
                let submitted = worker.submit(block);
                self.item_count = 0;
                return match submitted {
                    Ok(()) => Ok(()),
                    Err(CaptureError::PersistBacklog) => {
                        self.metrics.record_failure(&CaptureError::PersistBacklog);
                        warn!("{}: persist queue full, capture dropped", self.name);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
            }
        };

        self.persist_inline(persister, block).await
    }

    async fn persist_inline(
        &mut self,
        persister: Arc<dyn CapturePersist>,
        block: CaptureBlock,
    ) -> Result<()> {
        match persister.persist(&block).await {
            Err(
                e @ (CaptureError::DestinationNameExhausted { .. }
                | CaptureError::StorageWrite { .. }),
            ) => {
                // Keep the samples; the buffer stays full
                self.buffer = block.into_samples();
                self.metrics.record_failure(&e);
                error!("{}: capture failed: {}", self.name, e);
                Err(e)
            }
            outcome => {
                self.item_count = 0;
                self.handle_outcome(outcome)
            }
        }
    }
}

#[async_trait]
impl ProcessingNode for CaptureSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&mut self, input: SampleFrame) -> Result<Option<SampleFrame>> {
        self.drain_capture_port();
        self.collect_outcomes()?;

        if !self.capture_flag.is_set() {
            return Ok(None);
        }

        if input.vector_len != self.vector_len {
            return Err(CaptureError::Stream(format!(
                "frame carries {} values per item, sink expects {}",
                input.vector_len, self.vector_len
            )));
        }

        for item in input.items() {
            // Left full by a failed persist
            if self.item_count == self.chunk_size && !self.handle_full_buffer().await? {
                break;
            }

            self.buffer.extend_from_slice(item);
            self.item_count += 1;

            if self.item_count == self.chunk_size && !self.handle_full_buffer().await? {
                break;
            }
        }

        Ok(None)
    }

    async fn on_stop(&mut self) -> Result<()> {
        self.shutdown().await
    }
}
