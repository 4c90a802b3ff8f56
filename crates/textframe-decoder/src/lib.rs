pub mod backends;
pub mod config;
pub mod core;

pub use config::{Backend, Configuration, DEFAULT_FRAME_STRIDE};
pub use core::{
    DynFrameProvider, FrameResult, FrameStream, FrameStreamError, FrameStreamProvider, RgbFrame,
    VideoMetadata, spawn_stream_from_channel,
};
