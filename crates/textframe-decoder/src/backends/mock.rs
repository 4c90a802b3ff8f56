use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::config::Configuration;
use crate::core::{
    DynFrameProvider, FrameResult, FrameStream, FrameStreamProvider, RgbFrame, VideoMetadata,
    spawn_stream_from_channel,
};

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Synthetic provider used in tests and CI. Only frame indices on the stride
/// grid are materialized; skipped indices cost nothing, which mirrors the
/// cheap-skip contract real backends approximate.
pub struct MockProvider {
    width: u32,
    height: u32,
    stride: usize,
    frame_count: u64,
    frame_stride: u64,
    fps: f64,
    channel_capacity: usize,
}

impl MockProvider {
    pub fn new(config: &Configuration) -> Self {
        let width = 320u32;
        let capacity = config
            .channel_capacity
            .map(|n| n.get())
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        Self {
            width,
            height: 180,
            stride: width as usize * 3,
            frame_count: 1200,
            frame_stride: config.frame_stride.get(),
            fps: 24.0,
            channel_capacity: capacity.max(1),
        }
    }

    fn emit_frames(&self, tx: Sender<FrameResult<RgbFrame>>) {
        let mut index = 0u64;
        while index < self.frame_count {
            if tx.is_closed() {
                break;
            }
            let mut buffer = vec![0u8; self.stride * self.height as usize];
            for (row, chunk) in buffer.chunks_mut(self.stride).enumerate() {
                let value = ((row as u64 + index) % 256) as u8;
                chunk.fill(value);
            }
            let timestamp = Duration::from_secs_f64(index as f64 / self.fps);
            let frame = RgbFrame::from_owned(
                self.width,
                self.height,
                self.stride,
                index,
                Some(timestamp),
                buffer,
            );
            if tx.blocking_send(frame).is_err() {
                break;
            }
            index += self.frame_stride;
        }
    }
}

impl FrameStreamProvider for MockProvider {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(self.frame_count as f64 / self.fps)),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frame_count),
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            provider.emit_frames(tx);
        })
    }
}

pub fn boxed_mock(config: &Configuration) -> FrameResult<DynFrameProvider> {
    Ok(Box::new(MockProvider::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use std::num::NonZeroU64;
    use tokio_stream::StreamExt;

    fn mock_config(stride: u64) -> Configuration {
        Configuration {
            backend: Backend::Mock,
            input: None,
            frame_stride: NonZeroU64::new(stride).unwrap(),
            channel_capacity: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mock_backend_emits_stride_aligned_frames() {
        let provider = Box::new(MockProvider::new(&mock_config(240)));
        let metadata = provider.metadata();
        assert_eq!(metadata.total_frames, Some(1200));

        let indices: Vec<u64> = provider
            .into_stream()
            .map(|item| item.unwrap().frame_index())
            .collect()
            .await;
        assert_eq!(indices, vec![0, 240, 480, 720, 960]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mock_timestamps_follow_frame_index_over_fps() {
        let provider = Box::new(MockProvider::new(&mock_config(240)));
        let mut stream = provider.into_stream();
        let _first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        let expected = Duration::from_secs_f64(240.0 / 24.0);
        assert_eq!(second.timestamp(), Some(expected));
    }
}
