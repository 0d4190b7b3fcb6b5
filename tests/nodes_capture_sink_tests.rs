use async_trait::async_trait;
use iqcapture::capture::{CaptureBlock, CapturePersist, PersistReport};
use iqcapture::config::{CaptureConfig, CaptureMode, PersistMode, RecordFailurePolicy};
use iqcapture::core::{ProcessingNode, SampleFrame, SharedFlag};
use iqcapture::nodes::{CaptureSink, TriggerEvent};
use iqcapture::{CaptureError, Result};
use num_complex::Complex32;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Failure {
    None,
    Storage,
    Insert,
}

struct Persisted {
    samples: Vec<Complex32>,
    item_count: usize,
    fields: Map<String, Value>,
}

/// Records every block it is handed instead of touching disk.
struct RecordingPersist {
    blocks: Mutex<Vec<Persisted>>,
    failure: Mutex<Failure>,
}

impl RecordingPersist {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(Vec::new()),
            failure: Mutex::new(Failure::None),
        })
    }

    fn fail_with(&self, failure: Failure) {
        *self.failure.lock().unwrap() = failure;
    }

    fn persisted(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    fn samples(&self, index: usize) -> Vec<Complex32> {
        self.blocks.lock().unwrap()[index].samples.clone()
    }
}

#[async_trait]
impl CapturePersist for RecordingPersist {
    async fn persist(&self, block: &CaptureBlock) -> Result<PersistReport> {
        match *self.failure.lock().unwrap() {
            Failure::Storage => {
                return Err(CaptureError::StorageWrite {
                    path: PathBuf::from("/captures/capture-1"),
                    source: std::io::Error::other("disk full"),
                })
            }
            Failure::Insert => return Err(CaptureError::LocalInsert("store down".to_string())),
            Failure::None => {}
        }

        self.blocks.lock().unwrap().push(Persisted {
            samples: block.samples().to_vec(),
            item_count: block.item_count(),
            fields: block.template().fields().clone(),
        });
        Ok(PersistReport {
            destination: PathBuf::from("/captures/capture-1"),
            timestamp: 1,
            sample_count: block.item_count(),
            bytes_written: (block.samples().len() * 8) as u64,
            published: false,
            publish_error: None,
        })
    }
}

fn config(
    chunk_size: usize,
    persist_mode: PersistMode,
    capture_mode: CaptureMode,
) -> CaptureConfig {
    let mut config = CaptureConfig::new(chunk_size, "/captures");
    config.persist_mode = persist_mode;
    config.capture_mode = capture_mode;
    config
}

fn sink_with(config: &CaptureConfig, persist: &Arc<RecordingPersist>) -> CaptureSink {
    let persister: Arc<dyn CapturePersist> = persist.clone();
    CaptureSink::new(config, SharedFlag::anonymous().unwrap(), persister)
}

fn items(values: std::ops::Range<u32>) -> SampleFrame {
    let samples = values.map(|v| Complex32::new(v as f32, 0.0)).collect();
    SampleFrame::scalar(0, 0, samples)
}

#[tokio::test]
async fn test_continuous_capture_of_six_items_persists_two_blocks() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(3, PersistMode::Inline, CaptureMode::Continuous), &persist);
    sink.start_capture();

    let output = sink.process(items(0..6)).await.unwrap();

    assert!(output.is_none());
    assert_eq!(persist.persisted(), 2);
    assert_eq!(persist.samples(0), items(0..3).samples);
    assert_eq!(persist.samples(1), items(3..6).samples);
    assert_eq!(sink.buffered_items(), 0);
    assert!(sink.is_capturing());
}

#[tokio::test]
async fn test_continuous_capture_leaves_remainder_buffered() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(3, PersistMode::Inline, CaptureMode::Continuous), &persist);
    sink.start_capture();

    sink.process(items(0..4)).await.unwrap();
    sink.process(items(4..10)).await.unwrap();

    assert_eq!(persist.persisted(), 10 / 3);
    assert_eq!(sink.buffered_items(), 10 % 3);
    let blocks = persist.blocks.lock().unwrap();
    assert!(blocks.iter().all(|b| b.item_count == 3));
    assert_eq!(blocks[1].samples, items(3..6).samples);
}

#[tokio::test]
async fn test_one_shot_clears_flag_and_ignores_rest_of_frame() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(3, PersistMode::Inline, CaptureMode::OneShot), &persist);
    sink.start_capture();

    sink.process(items(0..5)).await.unwrap();

    assert_eq!(persist.persisted(), 1);
    assert_eq!(persist.samples(0), items(0..3).samples);
    assert!(!sink.is_capturing());
    assert_eq!(sink.buffered_items(), 0);

    sink.process(items(5..10)).await.unwrap();
    assert_eq!(persist.persisted(), 1);
}

#[tokio::test]
async fn test_disabled_sink_ignores_input() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(2, PersistMode::Inline, CaptureMode::Continuous), &persist);

    let output = sink.process(items(0..8)).await.unwrap();

    assert!(output.is_none());
    assert_eq!(sink.buffered_items(), 0);
    assert_eq!(persist.persisted(), 0);
}

#[tokio::test]
async fn test_partial_buffer_survives_stop_and_restart() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(4, PersistMode::Inline, CaptureMode::OneShot), &persist);

    sink.start_capture();
    sink.process(items(0..2)).await.unwrap();
    sink.stop_capture();
    sink.process(items(100..110)).await.unwrap();
    sink.start_capture();
    sink.process(items(2..4)).await.unwrap();

    assert_eq!(persist.persisted(), 1);
    assert_eq!(persist.samples(0), items(0..4).samples);
}

#[tokio::test]
async fn test_capture_port_message_starts_capture() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(2, PersistMode::Inline, CaptureMode::OneShot), &persist);

    sink.capture_port().try_send(TriggerEvent::Start).unwrap();
    sink.process(items(0..2)).await.unwrap();

    assert_eq!(persist.persisted(), 1);
    assert!(!sink.is_capturing());
}

#[tokio::test]
async fn test_inline_storage_failure_keeps_buffer_full() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(3, PersistMode::Inline, CaptureMode::Continuous), &persist);
    sink.start_capture();
    persist.fail_with(Failure::Storage);

    let result = sink.process(items(0..3)).await;
    assert!(matches!(result, Err(CaptureError::StorageWrite { .. })));
    assert_eq!(sink.buffered_items(), 3);
    assert_eq!(sink.metrics().snapshot().storage_failures, 1);

    // Next call retries the full buffer before accepting new items
    persist.fail_with(Failure::None);
    sink.process(items(3..4)).await.unwrap();

    assert_eq!(persist.persisted(), 1);
    assert_eq!(persist.samples(0), items(0..3).samples);
    assert_eq!(sink.buffered_items(), 1);
}

#[tokio::test]
async fn test_inline_insert_failure_respects_policy() {
    let persist = RecordingPersist::new();
    persist.fail_with(Failure::Insert);

    let mut abort = sink_with(&config(2, PersistMode::Inline, CaptureMode::Continuous), &persist);
    abort.start_capture();
    let result = abort.process(items(0..2)).await;
    assert!(matches!(result, Err(CaptureError::LocalInsert(_))));
    assert_eq!(abort.buffered_items(), 0);

    let mut cfg = config(2, PersistMode::Inline, CaptureMode::Continuous);
    cfg.record_failure = RecordFailurePolicy::Continue;
    let mut keep_going = sink_with(&cfg, &persist);
    keep_going.start_capture();
    keep_going.process(items(0..2)).await.unwrap();
    assert_eq!(keep_going.metrics().snapshot().insert_failures, 1);
}

#[tokio::test]
async fn test_background_persist_completes_on_shutdown() {
    let persist = RecordingPersist::new();
    let cfg = config(2, PersistMode::Background, CaptureMode::Continuous);
    let mut sink = sink_with(&cfg, &persist);
    sink.start_capture();

    sink.process(items(0..7)).await.unwrap();
    sink.shutdown().await.unwrap();

    assert_eq!(persist.persisted(), 3);
    assert_eq!(persist.samples(2), items(4..6).samples);
    let snapshot = sink.metrics().snapshot();
    assert_eq!(snapshot.captures_started, 3);
    assert_eq!(snapshot.captures_persisted, 3);
}

#[tokio::test]
async fn test_background_insert_failure_surfaces_at_shutdown() {
    let persist = RecordingPersist::new();
    persist.fail_with(Failure::Insert);
    let mut sink = sink_with(&config(2, PersistMode::Background, CaptureMode::OneShot), &persist);
    sink.start_capture();

    sink.process(items(0..2)).await.unwrap();
    let result = sink.shutdown().await;

    assert!(matches!(result, Err(CaptureError::LocalInsert(_))));
}

#[tokio::test]
async fn test_template_snapshot_taken_at_fill() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(2, PersistMode::Inline, CaptureMode::Continuous), &persist);
    sink.set_event_template(r#"{"SensorID": "north", "t": 99}"#).unwrap();
    sink.start_capture();

    sink.process(items(0..2)).await.unwrap();
    sink.set_event_template(r#"{"SensorID": "south"}"#).unwrap();
    sink.process(items(2..4)).await.unwrap();

    let blocks = persist.blocks.lock().unwrap();
    assert_eq!(blocks[0].fields.get("SensorID"), Some(&json!("north")));
    assert!(blocks[0].fields.get("t").is_none());
    assert_eq!(blocks[1].fields.get("SensorID"), Some(&json!("south")));
}

#[tokio::test]
async fn test_invalid_template_keeps_previous() {
    let persist = RecordingPersist::new();
    let mut sink = sink_with(&config(1, PersistMode::Inline, CaptureMode::OneShot), &persist);
    sink.set_event_template(r#"{"SensorID": "north"}"#).unwrap();

    let result = sink.set_event_template("{not json");
    assert!(matches!(result, Err(CaptureError::InvalidTemplate(_))));

    sink.start_capture();
    sink.process(items(0..1)).await.unwrap();
    let blocks = persist.blocks.lock().unwrap();
    assert_eq!(blocks[0].fields.get("SensorID"), Some(&json!("north")));
}

#[tokio::test]
async fn test_vector_items_are_kept_whole() {
    let persist = RecordingPersist::new();
    let mut cfg = config(2, PersistMode::Inline, CaptureMode::OneShot);
    cfg.item_size = 16;
    let mut sink = sink_with(&cfg, &persist);
    sink.start_capture();

    let samples: Vec<Complex32> = (0..4).map(|v| Complex32::new(v as f32, 1.0)).collect();
    sink.process(SampleFrame::new(0, 0, 2, samples.clone())).await.unwrap();

    assert_eq!(persist.samples(0), samples);
    assert_eq!(persist.blocks.lock().unwrap()[0].item_count, 2);

    sink.start_capture();
    let result = sink.process(items(0..2)).await;
    assert!(matches!(result, Err(CaptureError::Stream(_))));
}

#[tokio::test]
async fn test_full_persist_queue_drops_captures() {
    let persist = RecordingPersist::new();
    let mut cfg = config(2, PersistMode::Background, CaptureMode::Continuous);
    cfg.max_pending_captures = 1;
    let mut sink = sink_with(&cfg, &persist);
    sink.start_capture();

    // The single-threaded test runtime cannot run the worker mid-call
    sink.process(items(0..6)).await.unwrap();
    sink.shutdown().await.unwrap();

    assert_eq!(persist.persisted(), 1);
    let snapshot = sink.metrics().snapshot();
    assert_eq!(snapshot.captures_dropped, 2);
    assert_eq!(sink.buffered_items(), 0);
}
