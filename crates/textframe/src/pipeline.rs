use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use textframe_decoder::FrameStream;
use textframe_detector::{TextDetectionError, TextDetector};
use textframe_hash::phash;
use textframe_types::{FrameStreamError, KeyframeRecord};
use tokio_stream::StreamExt;

use crate::output::{KeyframeWriter, OutputError};
use crate::selector::KeyframeSelector;

#[derive(Debug)]
pub enum PipelineError {
    Stream(FrameStreamError),
    Detection(TextDetectionError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Stream(err) => write!(f, "frame stream error: {err}"),
            PipelineError::Detection(err) => write!(f, "text detection error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Stream(err) => Some(err),
            PipelineError::Detection(err) => Some(err),
        }
    }
}

pub struct PipelineConfig {
    pub density_threshold: usize,
    pub similarity_threshold: u32,
}

/// Result of a completed pipeline run. `stream_error` carries a recoverable
/// decode failure that stopped the stream early; `write_error` carries a
/// storage failure that stopped persistence. Either way the records gathered
/// before the failure are still valid and returned.
pub struct PipelineOutcome {
    pub records: Vec<KeyframeRecord>,
    pub frames_processed: u64,
    pub stream_error: Option<FrameStreamError>,
    pub write_error: Option<OutputError>,
}

/// Drives sampled frames through detection, hashing, run selection, and
/// persistence.
///
/// Density gating happens first so hashing only runs on frames that can
/// become keyframes. A cancelled run behaves like a short stream: the open
/// run is flushed and everything written so far stays on disk. A storage
/// failure stops persistence without retrying, but the records written
/// before it come back in the outcome so the caller can keep them.
pub async fn run_pipeline<D>(
    mut stream: FrameStream,
    detector: &D,
    writer: &KeyframeWriter,
    config: &PipelineConfig,
    cancel: Arc<AtomicBool>,
    mut on_frame: impl FnMut(u64),
) -> Result<PipelineOutcome, PipelineError>
where
    D: TextDetector,
{
    let mut selector = KeyframeSelector::new(config.similarity_threshold);
    let mut records = Vec::new();
    let mut frames_processed = 0u64;
    let mut stream_error = None;
    let mut write_error = None;

    while let Some(item) = stream.next().await {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let frame = match item {
            Ok(frame) => frame,
            Err(err) if err.is_recoverable() => {
                stream_error = Some(err);
                break;
            }
            Err(err) => return Err(PipelineError::Stream(err)),
        };

        frames_processed += 1;
        let detection = detector.detect(&frame).map_err(PipelineError::Detection)?;
        if detection.region_count > config.density_threshold {
            let fingerprint = phash(&frame);
            if let Some(emitted) = selector.observe(frame, fingerprint) {
                match writer.write(&emitted).await {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        write_error = Some(err);
                        break;
                    }
                }
            }
        }
        on_frame(frames_processed);
    }

    if write_error.is_none() {
        if let Some(emitted) = selector.flush() {
            match writer.write(&emitted).await {
                Ok(record) => records.push(record),
                Err(err) => write_error = Some(err),
            }
        }
    }

    Ok(PipelineOutcome {
        records,
        frames_processed,
        stream_error,
        write_error,
    })
}
