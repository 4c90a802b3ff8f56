//! Shared domain models for the textframe workspace.
//!
//! This crate centralizes lightweight data structures used across decoder,
//! detector, hash, and CLI crates. Keep it backend-agnostic and free of
//! native SDK dependencies so every crate can depend on it without pulling
//! heavy features.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameStreamError>;

/// A decoded RGB24 raster with its position in the sampled sequence.
///
/// The pixel payload is reference-counted, so cloning a frame is cheap and
/// a selected representative can outlive the pipeline step that produced it.
#[derive(Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: u64,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("frame_index", &self.frame_index)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RgbFrame {
    /// Builds a frame from an owned RGB24 buffer. `stride` is in bytes and
    /// must cover `width * 3` for every row.
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        frame_index: u64,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameStreamError::InvalidFrame {
                reason: format!("degenerate dimensions {}x{}", width, height),
            });
        }
        if stride < width as usize * 3 {
            return Err(FrameStreamError::InvalidFrame {
                reason: format!("stride {} shorter than row length {}", stride, width * 3),
            });
        }
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| FrameStreamError::InvalidFrame {
                    reason: "calculated frame length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(FrameStreamError::InvalidFrame {
                reason: format!(
                    "insufficient pixel bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            frame_index,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB bytes for one row, without any stride padding.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width as usize * 3]
    }
}

#[derive(Debug, Error)]
pub enum FrameStreamError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("failed to open video with {backend} backend: {message}")]
    Open {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} backend failed mid-stream: {message}")]
    Read {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameStreamError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn open(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Open {
            backend,
            message: message.into(),
        }
    }

    pub fn read(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Read {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Mid-stream read failures terminate sampling early but leave already
    /// produced results valid; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

/// One persisted keyframe. Created exactly once per closed run and immutable
/// afterwards; the caller owns the record once it is returned.
#[derive(Debug, Clone, Serialize)]
pub struct KeyframeRecord {
    pub frame_index: u64,
    /// Seconds from stream start, `frame_index / fps`.
    pub timestamp: f64,
    pub source_video: String,
    pub image_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_accessors_work() {
        let frame = RgbFrame::from_owned(
            4,
            2,
            12,
            7,
            Some(Duration::from_millis(291)),
            vec![0; 24],
        )
        .unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.stride(), 12);
        assert_eq!(frame.frame_index(), 7);
        assert_eq!(frame.timestamp(), Some(Duration::from_millis(291)));
        assert_eq!(frame.data().len(), 24);
        assert_eq!(frame.row(1).len(), 12);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let result = RgbFrame::from_owned(4, 2, 12, 0, None, vec![0; 23]);
        assert!(matches!(
            result,
            Err(FrameStreamError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn zero_dimension_frames_are_rejected() {
        for (width, height) in [(0u32, 2u32), (4, 0), (0, 0)] {
            let result = RgbFrame::from_owned(width, height, width as usize * 3, 0, None, vec![]);
            assert!(matches!(
                result,
                Err(FrameStreamError::InvalidFrame { .. })
            ));
        }
    }

    #[test]
    fn short_stride_is_rejected() {
        let result = RgbFrame::from_owned(4, 2, 8, 0, None, vec![0; 64]);
        assert!(matches!(
            result,
            Err(FrameStreamError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn only_read_errors_are_recoverable() {
        assert!(FrameStreamError::read("mock", "eof").is_recoverable());
        assert!(!FrameStreamError::open("mock", "missing").is_recoverable());
        assert!(!FrameStreamError::configuration("bad").is_recoverable());
    }
}
