use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, ImageEncoder};
use textframe_types::{KeyframeRecord, RgbFrame};
use tokio::task;

use crate::cli::ImageFormat;
use crate::output::error::OutputError;

/// Persists selected keyframes as images and builds their records.
///
/// Filenames are derived from the frame index with zero padding so a
/// directory listing sorts in stream order.
pub struct KeyframeWriter {
    directory: PathBuf,
    format: ImageFormat,
    fps: Option<f64>,
    source_video: String,
}

impl KeyframeWriter {
    pub fn new(
        directory: PathBuf,
        format: ImageFormat,
        fps: Option<f64>,
        source_video: String,
    ) -> Self {
        Self {
            directory,
            format,
            fps,
            source_video,
        }
    }

    /// Encodes and writes one keyframe, returning its record. Any failure
    /// here loses the keyframe, so callers treat errors as fatal for the
    /// record in question.
    pub async fn write(&self, frame: &RgbFrame) -> Result<KeyframeRecord, OutputError> {
        let path = self.image_path(frame.frame_index());
        write_frame(frame, &path, self.format).await?;
        Ok(KeyframeRecord {
            frame_index: frame.frame_index(),
            timestamp: self.timestamp_secs(frame),
            source_video: self.source_video.clone(),
            image_path: path,
        })
    }

    fn image_path(&self, frame_index: u64) -> PathBuf {
        let filename = format!("frame_{:05}.{}", frame_index, self.format.extension());
        self.directory.join(filename)
    }

    fn timestamp_secs(&self, frame: &RgbFrame) -> f64 {
        if let Some(fps) = self.fps {
            if fps > 0.0 {
                return frame.frame_index() as f64 / fps;
            }
        }
        frame
            .timestamp()
            .map(|ts| ts.as_secs_f64())
            .unwrap_or(0.0)
    }
}

async fn write_frame(frame: &RgbFrame, path: &Path, format: ImageFormat) -> Result<(), OutputError> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride();
    let row_len = width * 3;
    let data = frame.data();

    let mut rgb_buffer = vec![0u8; row_len * height];
    for (row_idx, dest_row) in rgb_buffer.chunks_mut(row_len).enumerate() {
        let start = row_idx * stride;
        dest_row.copy_from_slice(&data[start..start + row_len]);
    }

    let encoded: Vec<u8> = match format {
        ImageFormat::Jpeg => {
            let mut encoded = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, 90);
            encoder.encode(&rgb_buffer, frame.width(), frame.height(), ColorType::Rgb8)?;
            encoded
        }
        ImageFormat::Png => {
            let mut encoded = Vec::new();
            let encoder = PngEncoder::new(&mut encoded);
            encoder.write_image(&rgb_buffer, frame.width(), frame.height(), ColorType::Rgb8)?;
            encoded
        }
        ImageFormat::Webp => {
            let mut encoded = Vec::new();
            let encoder = WebPEncoder::new_lossless(&mut encoded);
            encoder.encode(&rgb_buffer, frame.width(), frame.height(), ColorType::Rgb8)?;
            encoded
        }
    };

    let target = path.to_path_buf();
    let written = task::spawn_blocking(move || std::fs::write(&target, encoded))
        .await
        .map_err(|err| {
            OutputError::image_write(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, format!("join error: {err}")),
            )
        })?;
    written.map_err(|err| OutputError::image_write(path, err))
}
