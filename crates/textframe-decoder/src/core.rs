use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::unfold;
use tokio::sync::mpsc::{self, Sender};

pub use textframe_types::{FrameResult, FrameStreamError, RgbFrame};

pub type FrameStream = Pin<Box<dyn Stream<Item = FrameResult<RgbFrame>> + Send>>;

pub type DynFrameProvider = Box<dyn FrameStreamProvider>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl VideoMetadata {
    /// Total frame count, falling back to `duration * fps` when the
    /// container does not carry an explicit count.
    pub fn resolve_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }
        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let total = (duration.as_secs_f64() * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }
        None
    }
}

/// A lazy, finite, non-restartable source of sampled frames. Providers own
/// their video handle exclusively and release it when the stream ends.
pub trait FrameStreamProvider: Send + 'static {
    fn metadata(&self) -> VideoMetadata;

    fn into_stream(self: Box<Self>) -> FrameStream;
}

/// Runs `task` on a blocking thread and exposes its output as a stream. The
/// bounded channel is the pipeline's backpressure: the producer blocks once
/// `capacity` frames are buffered.
pub fn spawn_stream_from_channel(
    capacity: usize,
    task: impl FnOnce(Sender<FrameResult<RgbFrame>>) + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::task::spawn_blocking(move || task(tx));
    let stream = unfold(rx, |mut receiver| async {
        receiver.recv().await.map(|item| (item, receiver))
    });
    Box::pin(stream)
}
