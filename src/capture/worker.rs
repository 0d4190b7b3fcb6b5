use log::error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::persist::{CaptureBlock, CapturePersist, PersistReport};
use crate::error::{CaptureError, Result};

/// Runs persist cycles off the streaming task, one at a time, in order.
pub struct PersistWorker {
    jobs: Option<mpsc::Sender<CaptureBlock>>,
    outcomes: mpsc::UnboundedReceiver<Result<PersistReport>>,
    handle: Option<JoinHandle<()>>,
}

impl PersistWorker {
    /// Spawn the worker task. Must be called within a Tokio runtime.
    pub fn spawn(persister: Arc<dyn CapturePersist>, capacity: usize) -> Self {
        let (job_tx, mut job_rx) = mpsc::channel::<CaptureBlock>(capacity.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Some(block) = job_rx.recv().await {
                let outcome = persister.persist(&block).await;
                // Buffer goes back to its pool here
                drop(block);
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
        });

        Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            handle: Some(handle),
        }
    }

    /// Queue a block without waiting.
    pub fn submit(&self, block: CaptureBlock) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| CaptureError::Stream("persist worker is shut down".into()))?;

        jobs.try_send(block).map_err(|e| match e {
            TrySendError::Full(_) => CaptureError::PersistBacklog,
            TrySendError::Closed(_) => CaptureError::Stream("persist worker stopped".into()),
        })
    }

    /// Outcomes finished since the last call.
    pub fn try_outcomes(&mut self) -> Vec<Result<PersistReport>> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.outcomes.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Finish every queued block and return the outstanding outcomes.
    pub async fn shutdown(&mut self) -> Vec<Result<PersistReport>> {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("persist worker terminated abnormally: {}", e);
            }
        }
        self.try_outcomes()
    }
}
