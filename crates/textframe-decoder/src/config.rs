use std::env;
use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::{DynFrameProvider, FrameResult, FrameStreamError};

pub const DEFAULT_FRAME_STRIDE: u64 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Ffmpeg,
}

impl FromStr for Backend {
    type Err = FrameStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "ffmpeg" => Ok(Backend::Ffmpeg),
            other => Err(FrameStreamError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-ffmpeg")]
    {
        backends.push(Backend::Ffmpeg);
    }
    backends.push(Backend::Mock);
    backends
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    /// Frame-index interval between sampled frames.
    pub frame_stride: NonZeroU64,
    pub channel_capacity: Option<NonZeroUsize>,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Mock);
        Self {
            backend,
            input: None,
            frame_stride: NonZeroU64::new(DEFAULT_FRAME_STRIDE).unwrap(),
            channel_capacity: None,
        }
    }
}

impl Configuration {
    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("TEXTFRAME_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("TEXTFRAME_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Ok(stride) = env::var("TEXTFRAME_FRAME_STRIDE") {
            let parsed: u64 = stride.parse().map_err(|_| {
                FrameStreamError::configuration(format!(
                    "failed to parse TEXTFRAME_FRAME_STRIDE='{stride}' as a positive integer"
                ))
            })?;
            let Some(value) = NonZeroU64::new(parsed) else {
                return Err(FrameStreamError::configuration(
                    "TEXTFRAME_FRAME_STRIDE must be greater than zero",
                ));
            };
            config.frame_stride = value;
        }
        if let Ok(capacity) = env::var("TEXTFRAME_CHANNEL_CAPACITY") {
            let parsed: usize = capacity.parse().map_err(|_| {
                FrameStreamError::configuration(format!(
                    "failed to parse TEXTFRAME_CHANNEL_CAPACITY='{capacity}' as a positive integer"
                ))
            })?;
            let Some(value) = NonZeroUsize::new(parsed) else {
                return Err(FrameStreamError::configuration(
                    "TEXTFRAME_CHANNEL_CAPACITY must be greater than zero",
                ));
            };
            config.channel_capacity = Some(value);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn create_provider(&self) -> FrameResult<DynFrameProvider> {
        match self.backend {
            Backend::Mock => crate::backends::mock::boxed_mock(self),
            Backend::Ffmpeg => {
                #[cfg(feature = "backend-ffmpeg")]
                {
                    let path = self.input.clone().ok_or_else(|| {
                        FrameStreamError::configuration(
                            "ffmpeg backend requires an input video path",
                        )
                    })?;
                    crate::backends::ffmpeg::boxed_ffmpeg(path, self)
                }
                #[cfg(not(feature = "backend-ffmpeg"))]
                {
                    Err(FrameStreamError::unsupported("ffmpeg"))
                }
            }
        }
    }
}
