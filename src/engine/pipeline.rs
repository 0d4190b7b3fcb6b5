use anyhow::{anyhow, Result};
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controls::{open_flags, CaptureControls};
use super::state::PipelineState;
use crate::config::CaptureConfig;
use crate::core::{ProcessingNode, SampleFrame};
use crate::nodes::{CaptureSink, LevelTrigger};
use crate::observability::{CaptureMetrics, NodeMetrics, NodeSnapshot};

/// Level trigger feeding a capture sink on one streaming task.
///
/// Frames pushed into the pipeline pass through the trigger and then the
/// sink, so a start event raised by the trigger is seen by the sink while it
/// handles the same frame.
pub struct CapturePipeline {
    nodes: Option<(LevelTrigger, CaptureSink)>,
    controls: CaptureControls,
    input: Option<mpsc::Sender<SampleFrame>>,
    handle: Option<JoinHandle<crate::Result<u64>>>,
    channel_capacity: usize,
    trigger_metrics: Arc<NodeMetrics>,
    sink_metrics: Arc<NodeMetrics>,
    capture_metrics: Arc<CaptureMetrics>,
    state: PipelineState,
}

impl CapturePipeline {
    /// Must be called inside a Tokio runtime when `persist_mode` is
    /// `background`.
    pub async fn from_config(config: &CaptureConfig) -> Result<Self> {
        config.validate()?;
        let (capture, armed) = open_flags(config.flag_dir.as_deref())?;
        let trigger = LevelTrigger::from_config(config, armed);
        let sink = CaptureSink::from_config(config, capture)?;
        Ok(Self::with_parts(trigger, sink, config.channel_capacity))
    }

    pub fn with_parts(
        mut trigger: LevelTrigger,
        sink: CaptureSink,
        channel_capacity: usize,
    ) -> Self {
        trigger.connect(sink.capture_port());
        let controls = CaptureControls::new(
            sink.capture_flag(),
            trigger.armed_flag(),
            sink.template_handle(),
        );
        let capture_metrics = sink.metrics();

        Self {
            trigger_metrics: Arc::new(NodeMetrics::new(trigger.name())),
            sink_metrics: Arc::new(NodeMetrics::new(sink.name())),
            nodes: Some((trigger, sink)),
            controls,
            input: None,
            handle: None,
            channel_capacity: channel_capacity.max(1),
            capture_metrics,
            state: PipelineState::Idle,
        }
    }

    /// Get current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Transition to a new state with validation
    pub fn transition_to(&mut self, new_state: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        self.state = new_state;
        Ok(())
    }

    pub fn controls(&self) -> CaptureControls {
        self.controls.clone()
    }

    pub fn capture_metrics(&self) -> Arc<CaptureMetrics> {
        self.capture_metrics.clone()
    }

    pub fn node_metrics(&self) -> Vec<NodeSnapshot> {
        vec![self.trigger_metrics.snapshot(), self.sink_metrics.snapshot()]
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition_to(PipelineState::Initializing)?;

        let (mut trigger, mut sink) = match self.nodes.take() {
            Some(nodes) => nodes,
            None => {
                self.transition_to(PipelineState::Error {
                    error_msg: "pipeline nodes already consumed".to_string(),
                })?;
                return Err(anyhow!("pipeline cannot be restarted"));
            }
        };

        let (tx, mut rx) = mpsc::channel::<SampleFrame>(self.channel_capacity);
        let trigger_metrics = self.trigger_metrics.clone();
        let sink_metrics = self.sink_metrics.clone();

        let handle = tokio::spawn(async move {
            let mut frames = 0u64;
            let mut outcome = Ok(());

            while let Some(frame) = rx.recv().await {
                frames += 1;
                let passed = match run_node(&mut trigger, &trigger_metrics, frame).await {
                    Ok(passed) => passed,
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                };
                if let Some(frame) = passed {
                    if let Err(e) = run_node(&mut sink, &sink_metrics, frame).await {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            // Always drain queued captures, even after a failure
            let trigger_stop = trigger.on_stop().await;
            let sink_stop = sink.on_stop().await;
            outcome.and(trigger_stop).and(sink_stop).map(|()| frames)
        });

        self.input = Some(tx);
        self.handle = Some(handle);
        self.transition_to(PipelineState::Running {
            start_time: Some(Instant::now()),
        })?;
        info!("capture pipeline running");
        Ok(())
    }

    /// Queue a frame for the streaming task. Fails once the task has stopped.
    pub async fn push(&self, frame: SampleFrame) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| anyhow!("pipeline is not running"))?;
        input
            .send(frame)
            .await
            .map_err(|_| anyhow!("capture pipeline stopped"))
    }

    /// Close the input, wait for the streaming task and return the number of
    /// frames it handled.
    pub async fn stop(&mut self) -> Result<u64> {
        drop(self.input.take());
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("pipeline is not running"))?;

        let start_time = match &self.state {
            PipelineState::Running { start_time } => *start_time,
            _ => None,
        };

        let result = match handle.await {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow!("streaming task failed: {}", e)),
        };

        match result {
            Ok(total_frames) => {
                self.transition_to(PipelineState::Completed {
                    duration: start_time.map(|t| t.elapsed()),
                    total_frames,
                })?;
                info!("capture pipeline stopped after {} frames", total_frames);
                Ok(total_frames)
            }
            Err(e) => {
                error!("capture pipeline failed: {}", e);
                self.transition_to(PipelineState::Error {
                    error_msg: e.to_string(),
                })?;
                Err(e)
            }
        }
    }
}

async fn run_node<N: ProcessingNode>(
    node: &mut N,
    metrics: &NodeMetrics,
    frame: SampleFrame,
) -> crate::Result<Option<SampleFrame>> {
    let start = metrics.start_processing();
    let items = frame.item_count();
    match node.process(frame).await {
        Ok(output) => {
            metrics.finish_processing(start);
            metrics.record_frame_processed(items);
            Ok(output)
        }
        Err(e) => {
            metrics.record_error();
            Err(e)
        }
    }
}
