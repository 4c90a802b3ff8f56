use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources, ImageFormat};

const DEFAULT_OUTPUT_DIR: &str = "keyframes";
const DEFAULT_RECORDS_FILE: &str = "keyframes.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    model: Option<String>,
    output_dir: Option<String>,
    image_format: Option<String>,
    frame_stride: Option<u64>,
    density_threshold: Option<usize>,
    similarity_threshold: Option<u32>,
    confidence_threshold: Option<f32>,
    channel_capacity: Option<usize>,
    records: Option<RecordsFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct RecordsFileConfig {
    file: Option<String>,
    pretty: Option<bool>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<String>,
    pub model: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub image_format: ImageFormat,
    pub frame_stride: u64,
    pub density_threshold: usize,
    pub similarity_threshold: u32,
    pub confidence_threshold: f32,
    pub channel_capacity: Option<usize>,
    pub records_filename: String,
    pub records_pretty: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    if let Some(project_path) = project_config_path() {
        if project_path.exists() {
            let config = read_config(&project_path)?;
            return Ok((config, Some(project_path)));
        }
    }

    let Some(default_path) = default_config_path() else {
        return Ok((FileConfig::default(), None));
    };
    if !default_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    let config = read_config(&default_path)?;
    Ok((config, Some(default_path)))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        backend: file_backend,
        model: file_model,
        output_dir: file_output_dir,
        image_format: file_image_format,
        frame_stride: file_frame_stride,
        density_threshold: file_density_threshold,
        similarity_threshold: file_similarity_threshold,
        confidence_threshold: file_confidence_threshold,
        channel_capacity: file_channel_capacity,
        records: file_records,
    } = file;

    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file_backend);
    }

    let model = match cli.model.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_model)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref())),
    };

    let output_dir = match cli.output_dir.clone() {
        Some(path) => expand_pathbuf(path),
        None => normalize_string(file_output_dir)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    };

    let mut image_format = cli.image_format;
    if !sources.image_format_from_cli {
        if let Some(value) = normalize_string(file_image_format) {
            image_format =
                ImageFormat::from_str(&value, false).map_err(|_| ConfigError::InvalidValue {
                    path: config_path.clone(),
                    field: "image_format",
                    value,
                })?;
        }
    }

    let mut frame_stride = cli.frame_stride;
    if !sources.frame_stride_from_cli {
        if let Some(value) = file_frame_stride {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "frame_stride",
                    value: value.to_string(),
                });
            }
            frame_stride = value;
        }
    }

    let mut density_threshold = cli.density_threshold;
    if !sources.density_threshold_from_cli {
        if let Some(value) = file_density_threshold {
            density_threshold = value;
        }
    }

    let mut similarity_threshold = cli.similarity_threshold;
    if !sources.similarity_threshold_from_cli {
        if let Some(value) = file_similarity_threshold {
            if value > 64 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "similarity_threshold",
                    value: value.to_string(),
                });
            }
            similarity_threshold = value;
        }
    }

    let mut confidence_threshold = cli.confidence_threshold;
    if !sources.confidence_threshold_from_cli {
        if let Some(value) = file_confidence_threshold {
            confidence_threshold = value;
        }
    }
    if !(0.0..=1.0).contains(&confidence_threshold) {
        return Err(ConfigError::InvalidValue {
            path: config_path,
            field: "confidence_threshold",
            value: confidence_threshold.to_string(),
        });
    }

    let mut channel_capacity = cli.channel_capacity;
    if let Some(0) = channel_capacity {
        return Err(ConfigError::InvalidValue {
            path: None,
            field: "channel_capacity",
            value: "0".to_string(),
        });
    }
    if !sources.channel_capacity_from_cli {
        if let Some(value) = file_channel_capacity {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "channel_capacity",
                    value: value.to_string(),
                });
            }
            channel_capacity = Some(value);
        }
    }

    let records_filename = normalize_string(cli.records_file.clone())
        .or_else(|| {
            file_records
                .as_ref()
                .and_then(|cfg| normalize_string(cfg.file.clone()))
        })
        .unwrap_or_else(|| DEFAULT_RECORDS_FILE.to_string());
    let records_pretty = cli
        .pretty_json
        .or_else(|| file_records.as_ref().and_then(|cfg| cfg.pretty))
        .unwrap_or(true);

    Ok(EffectiveSettings {
        backend,
        model,
        output_dir,
        image_format,
        frame_stride,
        density_threshold,
        similarity_threshold,
        confidence_threshold,
        channel_capacity,
        records_filename,
        records_pretty,
    })
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "textframe", "textframe")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("textframe.toml"))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    if expanded.is_absolute() || base.is_none() {
        Some(expanded)
    } else {
        Some(base.unwrap().join(expanded))
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}
