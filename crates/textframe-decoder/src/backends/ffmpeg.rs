#![cfg(feature = "backend-ffmpeg")]

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg::util::error::{EAGAIN, EWOULDBLOCK};
use ffmpeg_next as ffmpeg;
use tokio::sync::mpsc;

use crate::config::Configuration;
use crate::core::{
    DynFrameProvider, FrameResult, FrameStream, FrameStreamError, FrameStreamProvider, RgbFrame,
    VideoMetadata, spawn_stream_from_channel,
};

const BACKEND_NAME: &str = "ffmpeg";
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

pub struct FfmpegProvider {
    input: PathBuf,
    frame_stride: u64,
    channel_capacity: usize,
    metadata: VideoMetadata,
}

impl FfmpegProvider {
    /// Opens the container eagerly so an unreadable input fails here, before
    /// any frame is processed, and so fps/frame-count metadata is known up
    /// front.
    pub fn open<P: AsRef<Path>>(path: P, config: &Configuration) -> FrameResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameStreamError::open(
                BACKEND_NAME,
                format!("input file {} does not exist", path.display()),
            ));
        }
        ffmpeg::init()
            .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;
        let metadata = probe_metadata(path)?;
        let capacity = config
            .channel_capacity
            .map(|n| n.get())
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        Ok(Self {
            input: path.to_path_buf(),
            frame_stride: config.frame_stride.get(),
            channel_capacity: capacity.max(1),
            metadata,
        })
    }

    fn decode_loop(&self, tx: mpsc::Sender<FrameResult<RgbFrame>>) -> FrameResult<()> {
        let mut ictx = ffmpeg::format::input(&self.input)
            .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;
        let input_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| FrameStreamError::open(BACKEND_NAME, "no video stream found"))?;
        let stream_index = input_stream.index();
        let time_base = input_stream.time_base();

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;
        let mut decoder = context
            .decoder()
            .video()
            .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;

        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::FAST_BILINEAR,
        )
        .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;

        let mut decoded = ffmpeg::util::frame::Video::empty();
        let mut converted = ffmpeg::util::frame::Video::empty();
        let frame_stride = self.frame_stride;
        let mut frame_index: u64 = 0;

        // Packets must be decoded to keep reference frames valid, but only
        // stride-aligned indices pay for colorspace conversion and the
        // buffer copy.
        let mut drain = |decoder: &mut ffmpeg::decoder::Video| -> FrameResult<()> {
            loop {
                match decoder.receive_frame(&mut decoded) {
                    Ok(_) => {
                        let index = frame_index;
                        frame_index += 1;
                        if index % frame_stride != 0 {
                            continue;
                        }
                        scaler.run(&decoded, &mut converted).map_err(|err| {
                            FrameStreamError::read(BACKEND_NAME, err.to_string())
                        })?;
                        converted.set_pts(decoded.pts());
                        let frame = frame_from_converted(&converted, index, time_base)?;
                        if tx.blocking_send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        if is_retryable_error(&err) || matches!(err, ffmpeg::Error::Eof) {
                            break;
                        }
                        return Err(FrameStreamError::read(BACKEND_NAME, err.to_string()));
                    }
                }
            }
            Ok(())
        };

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            if let Err(err) = decoder.send_packet(&packet) {
                if !is_retryable_error(&err) {
                    return Err(FrameStreamError::read(BACKEND_NAME, err.to_string()));
                }
            }
            drain(&mut decoder)?;
        }

        decoder
            .send_eof()
            .map_err(|err| FrameStreamError::read(BACKEND_NAME, err.to_string()))?;
        drain(&mut decoder)?;
        Ok(())
    }
}

impl FrameStreamProvider for FfmpegProvider {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            let result = provider.decode_loop(tx.clone());
            if let Err(err) = result {
                let _ = tx.blocking_send(Err(err));
            }
        })
    }
}

fn probe_metadata(path: &Path) -> FrameResult<VideoMetadata> {
    let ictx = ffmpeg::format::input(&path)
        .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;
    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| FrameStreamError::open(BACKEND_NAME, "no video stream found"))?;

    let rate = stream.avg_frame_rate();
    let fps = if rate.denominator() != 0 {
        let value = f64::from(rate);
        (value.is_finite() && value > 0.0).then_some(value)
    } else {
        None
    };
    let total_frames = (stream.frames() > 0).then_some(stream.frames() as u64);
    let duration = (ictx.duration() > 0).then(|| {
        Duration::from_secs_f64(ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE))
    });

    let parameters = stream.parameters();
    let context = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|err| FrameStreamError::open(BACKEND_NAME, err.to_string()))?;
    let (width, height) = match context.decoder().video() {
        Ok(video) => (Some(video.width()), Some(video.height())),
        Err(_) => (None, None),
    };

    Ok(VideoMetadata {
        duration,
        fps,
        width,
        height,
        total_frames,
    })
}

fn frame_from_converted(
    frame: &ffmpeg::util::frame::Video,
    index: u64,
    time_base: ffmpeg::Rational,
) -> FrameResult<RgbFrame> {
    let plane = frame.data(0);
    let stride = frame.stride(0);
    let height = frame.height() as usize;
    let mut buffer = Vec::with_capacity(stride * height);
    for row in 0..height {
        let offset = row * stride;
        buffer.extend_from_slice(&plane[offset..offset + stride]);
    }
    let timestamp = frame.pts().map(|pts| {
        let seconds = pts as f64 * f64::from(time_base);
        Duration::from_secs_f64(seconds.max(0.0))
    });
    RgbFrame::from_owned(frame.width(), frame.height(), stride, index, timestamp, buffer)
}

fn is_retryable_error(error: &ffmpeg::Error) -> bool {
    matches!(
        error,
        ffmpeg::Error::Other { errno }
            if *errno == EAGAIN || *errno == EWOULDBLOCK
    )
}

pub fn boxed_ffmpeg<P: AsRef<Path>>(
    path: P,
    config: &Configuration,
) -> FrameResult<DynFrameProvider> {
    Ok(Box::new(FfmpegProvider::open(path, config)?))
}
