use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use textframe::cli::ImageFormat;
use textframe::output::{KeyframeWriter, OutputError};
use textframe::pipeline::{PipelineConfig, PipelineError, run_pipeline};
use textframe_decoder::FrameStream;
use textframe_detector::{DetectionResult, TextDetectionError, TextDetector};
use textframe_types::{FrameResult, FrameStreamError, RgbFrame};

const WIDTH: usize = 64;
const HEIGHT: usize = 48;

fn gradient_frame(index: u64) -> RgbFrame {
    let mut data = Vec::with_capacity(WIDTH * HEIGHT * 3);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let value = ((x * 4 + y) % 256) as u8;
            data.extend_from_slice(&[value, value, value]);
        }
    }
    RgbFrame::from_owned(WIDTH as u32, HEIGHT as u32, WIDTH * 3, index, None, data).unwrap()
}

fn checkerboard_frame(index: u64) -> RgbFrame {
    let mut data = Vec::with_capacity(WIDTH * HEIGHT * 3);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let value = if (x / 8 + y / 8) % 2 == 0 { 255 } else { 0 };
            data.extend_from_slice(&[value, value, value]);
        }
    }
    RgbFrame::from_owned(WIDTH as u32, HEIGHT as u32, WIDTH * 3, index, None, data).unwrap()
}

fn stream_of(items: Vec<FrameResult<RgbFrame>>) -> FrameStream {
    Box::pin(tokio_stream::iter(items))
}

/// Reports a scripted region count per frame index, defaulting to zero.
struct ScriptedDetector {
    counts: HashMap<u64, usize>,
}

impl ScriptedDetector {
    fn new(counts: &[(u64, usize)]) -> Self {
        Self {
            counts: counts.iter().copied().collect(),
        }
    }
}

impl TextDetector for ScriptedDetector {
    fn detect(&self, frame: &RgbFrame) -> Result<DetectionResult, TextDetectionError> {
        let region_count = self.counts.get(&frame.frame_index()).copied().unwrap_or(0);
        Ok(DetectionResult { region_count })
    }
}

struct FailingDetector;

impl TextDetector for FailingDetector {
    fn detect(&self, _frame: &RgbFrame) -> Result<DetectionResult, TextDetectionError> {
        Err(TextDetectionError::Inference("scripted failure".to_string()))
    }
}

fn writer(dir: &tempfile::TempDir) -> KeyframeWriter {
    KeyframeWriter::new(
        dir.path().to_path_buf(),
        ImageFormat::Png,
        Some(24.0),
        "input.mp4".to_string(),
    )
}

fn config() -> PipelineConfig {
    PipelineConfig {
        density_threshold: 50,
        similarity_threshold: 15,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn similar_dense_frames_collapse_and_last_one_wins() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Ok(gradient_frame(240)),
        Ok(checkerboard_frame(480)),
    ]);
    let detector = ScriptedDetector::new(&[(0, 60), (240, 60), (480, 60)]);

    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .unwrap();

    // Frames 0 and 240 share content, so 240 represents their run; 480
    // opens a second run closed by the flush.
    let indices: Vec<u64> = outcome.records.iter().map(|r| r.frame_index).collect();
    assert_eq!(indices, vec![240, 480]);
    assert_eq!(outcome.frames_processed, 3);
    let timestamps: Vec<f64> = outcome.records.iter().map(|r| r.timestamp).collect();
    assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(dir.path().join("frame_00240.png").exists());
    assert!(dir.path().join("frame_00480.png").exists());
    assert!(!dir.path().join("frame_00000.png").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn density_threshold_is_strictly_greater_than() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![Ok(gradient_frame(0)), Ok(gradient_frame(240))]);
    // Exactly at the threshold never qualifies.
    let detector = ScriptedDetector::new(&[(0, 50), (240, 50)]);

    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.frames_processed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn sparse_frames_between_dense_ones_do_not_split_runs() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Ok(checkerboard_frame(240)),
        Ok(gradient_frame(480)),
    ]);
    // The middle frame fails the density gate, so the outer two still form
    // one run despite the interruption.
    let detector = ScriptedDetector::new(&[(0, 60), (240, 0), (480, 60)]);

    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .unwrap();

    let indices: Vec<u64> = outcome.records.iter().map(|r| r.frame_index).collect();
    assert_eq!(indices, vec![480]);
}

#[tokio::test(flavor = "multi_thread")]
async fn recoverable_read_error_keeps_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Err(FrameStreamError::read("mock", "corrupt packet")),
        Ok(checkerboard_frame(480)),
    ]);
    let detector = ScriptedDetector::new(&[(0, 60), (480, 60)]);

    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .unwrap();

    assert!(outcome.stream_error.is_some());
    assert_eq!(outcome.frames_processed, 1);
    let indices: Vec<u64> = outcome.records.iter().map(|r| r.frame_index).collect();
    assert_eq!(indices, vec![0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn storage_failure_keeps_records_written_before_it() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Ok(checkerboard_frame(240)),
        Ok(gradient_frame(480)),
    ]);
    let detector = ScriptedDetector::new(&[(0, 60), (240, 60), (480, 60)]);

    // The output directory disappears after the second frame, so frame 0's
    // keyframe lands on disk but frame 240's write fails.
    let target = dir.path().to_path_buf();
    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        move |processed| {
            if processed == 2 {
                std::fs::remove_dir_all(&target).unwrap();
            }
        },
    )
    .await
    .unwrap();

    let indices: Vec<u64> = outcome.records.iter().map(|r| r.frame_index).collect();
    assert_eq!(indices, vec![0]);
    assert!(matches!(
        outcome.write_error,
        Some(OutputError::ImageWrite { .. })
    ));
    assert!(outcome.stream_error.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_stream_error_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Err(FrameStreamError::open("mock", "device lost")),
    ]);
    let detector = ScriptedDetector::new(&[(0, 60)]);

    let result = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await;

    assert!(matches!(result, Err(PipelineError::Stream(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn detection_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![Ok(gradient_frame(0))]);

    let result = run_pipeline(
        stream,
        &FailingDetector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await;

    assert!(matches!(result, Err(PipelineError::Detection(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_flushes_the_open_run() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(vec![
        Ok(gradient_frame(0)),
        Ok(gradient_frame(240)),
        Ok(gradient_frame(480)),
    ]);
    let detector = ScriptedDetector::new(&[(0, 60), (240, 60), (480, 60)]);

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        cancel,
        move |_| flag.store(true, Ordering::Relaxed),
    )
    .await
    .unwrap();

    // Cancelled after the first frame; its run still flushes to disk.
    assert_eq!(outcome.frames_processed, 1);
    let indices: Vec<u64> = outcome.records.iter().map(|r| r.frame_index).collect();
    assert_eq!(indices, vec![0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_stream_produces_no_records() {
    let dir = tempfile::tempdir().unwrap();
    let stream = stream_of(Vec::new());
    let detector = ScriptedDetector::new(&[]);

    let outcome = run_pipeline(
        stream,
        &detector,
        &writer(&dir),
        &config(),
        Arc::new(AtomicBool::new(false)),
        |_| {},
    )
    .await
    .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.frames_processed, 0);
}
