//! EAST text-density detection.
//!
//! The detector answers one question per frame: how many text regions does
//! the model see above a confidence threshold? Regions themselves are
//! discarded after counting; only the density matters downstream.

use std::path::PathBuf;

use thiserror::Error;

use textframe_types::RgbFrame;

pub mod east;
pub use east::EastTextDetector;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

#[derive(Debug, Error)]
pub enum TextDetectionError {
    #[error("model file not found: {path}")]
    ModelNotFound { path: PathBuf },
    #[error("failed to initialize onnx runtime environment: {0}")]
    Environment(String),
    #[error("failed to create inference session: {0}")]
    Session(String),
    #[error("failed to prepare model input: {0}")]
    Input(String),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output shape")]
    InvalidOutputShape,
}

#[derive(Debug, Clone)]
pub struct TextDetectionConfig {
    pub model_path: PathBuf,
    /// Minimum per-cell score for a decoded region to be counted.
    pub confidence_threshold: f32,
}

impl TextDetectionConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Count of decoded text regions passing the confidence threshold for one
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub region_count: usize,
}

/// Seam between the pipeline and the model backend; tests substitute stub
/// implementations.
pub trait TextDetector: Send + Sync {
    fn detect(&self, frame: &RgbFrame) -> Result<DetectionResult, TextDetectionError>;
}
