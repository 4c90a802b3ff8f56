use std::path::PathBuf;

use thiserror::Error;

/// Failures while persisting keyframes or their records. Each variant names
/// the artifact that was lost so the caller can point a retry at it.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to encode keyframe image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write keyframe image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize keyframe records: {0}")]
    RecordsSerialize(#[from] serde_json::Error),

    #[error("failed to write records file {path}: {source}")]
    RecordsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl OutputError {
    pub fn image_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ImageWrite {
            path: path.into(),
            source,
        }
    }

    pub fn records_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RecordsWrite {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }
}
