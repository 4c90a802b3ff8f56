use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use textframe::cli::parse_cli;
use textframe::output::{KeyframeWriter, OutputError, RecordsOutput};
use textframe::pipeline::{PipelineConfig, PipelineError, run_pipeline};
use textframe::settings::{ConfigError, resolve_settings};
use textframe_decoder::{Backend, Configuration, FrameStreamError};
use textframe_detector::{EastTextDetector, TextDetectionConfig, TextDetectionError};

#[derive(Debug)]
enum AppError {
    Stream(FrameStreamError),
    Config(ConfigError),
    Detection(TextDetectionError),
    Output(OutputError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Stream(err) => write!(f, "{err}"),
            AppError::Config(err) => write!(f, "{err}"),
            AppError::Detection(err) => write!(f, "{err}"),
            AppError::Output(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Stream(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Detection(err) => Some(err),
            AppError::Output(err) => Some(err),
        }
    }
}

impl From<FrameStreamError> for AppError {
    fn from(value: FrameStreamError) -> Self {
        AppError::Stream(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Stream(err) => AppError::Stream(err),
            PipelineError::Detection(err) => AppError::Detection(err),
        }
    }
}

fn print_available_backends() {
    println!("available backends:");
    for backend in Configuration::available_backends() {
        println!("  {backend}");
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), AppError> {
    let (cli, sources) = parse_cli();

    if cli.list_backends {
        print_available_backends();
        return Ok(());
    }

    let settings = resolve_settings(&cli, &sources)?;

    let Some(input) = cli.input.clone() else {
        return Err(FrameStreamError::configuration(
            "an input video path is required; see --help",
        )
        .into());
    };
    let Some(model_path) = settings.model.clone() else {
        return Err(FrameStreamError::configuration(
            "a text-detection model path is required; pass --model or set 'model' in the config file",
        )
        .into());
    };

    // The model loads before the video opens so a bad model path fails
    // without touching the input.
    let mut detection_config = TextDetectionConfig::new(model_path);
    detection_config.confidence_threshold = settings.confidence_threshold;
    let detector = EastTextDetector::new(detection_config).map_err(AppError::Detection)?;

    let env_backend_present = std::env::var("TEXTFRAME_BACKEND").is_ok();
    let env_stride_present = std::env::var("TEXTFRAME_FRAME_STRIDE").is_ok();
    let env_capacity_present = std::env::var("TEXTFRAME_CHANNEL_CAPACITY").is_ok();

    let mut config = Configuration::from_env()?;
    if let Some(name) = settings.backend.as_deref() {
        config.backend = Backend::from_str(name)?;
    } else if !env_backend_present {
        config.backend = Configuration::default().backend;
    }
    config.input = Some(input.clone());
    if sources.frame_stride_from_cli || !env_stride_present {
        config.frame_stride = NonZeroU64::new(settings.frame_stride).ok_or_else(|| {
            FrameStreamError::configuration("frame stride must be greater than zero")
        })?;
    }
    if sources.channel_capacity_from_cli || !env_capacity_present {
        if let Some(capacity) = settings.channel_capacity {
            config.channel_capacity = NonZeroUsize::new(capacity);
        }
    }

    let available = Configuration::available_backends();
    if !available.contains(&config.backend) {
        return Err(FrameStreamError::unsupported(config.backend.as_str()).into());
    }

    let provider = config.create_provider()?;
    let metadata = provider.metadata();

    let images_dir = settings.output_dir.join("images");
    std::fs::create_dir_all(&images_dir)
        .map_err(|err| AppError::Output(OutputError::create_dir(&images_dir, err)))?;

    let source_video = input.display().to_string();
    let writer = KeyframeWriter::new(
        images_dir,
        settings.image_format,
        metadata.fps,
        source_video,
    );
    let records_output = RecordsOutput::new(
        settings.output_dir.clone(),
        settings.records_filename.clone(),
        settings.records_pretty,
    );

    let stride = config.frame_stride.get();
    let sampled_total = metadata
        .resolve_total_frames()
        .map(|total| total.div_ceil(stride));
    let progress = build_progress(sampled_total);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt received, closing the current run");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let pipeline_config = PipelineConfig {
        density_threshold: settings.density_threshold,
        similarity_threshold: settings.similarity_threshold,
    };
    let bar = progress.clone();
    let outcome = run_pipeline(
        provider.into_stream(),
        &detector,
        &writer,
        &pipeline_config,
        cancel,
        move |processed| bar.set_position(processed),
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            progress.abandon_with_message("failed".to_string());
            return Err(err.into());
        }
    };
    progress.finish_and_clear();

    // Partial results are still persisted before any failure is reported.
    records_output
        .write(&outcome.records)
        .await
        .map_err(AppError::Output)?;

    if let Some(err) = outcome.stream_error {
        eprintln!(
            "stream stopped early after {} sampled frames: {err}",
            outcome.frames_processed
        );
    }
    if let Some(err) = outcome.write_error {
        eprintln!(
            "{} keyframes saved before the storage failure; records written to {}",
            outcome.records.len(),
            records_output.path().display()
        );
        return Err(AppError::Output(err));
    }
    println!(
        "{} keyframes written to {}",
        outcome.records.len(),
        settings.output_dir.display()
    );
    println!("records written to {}", records_output.path().display());

    Ok(())
}

fn build_progress(sampled_total: Option<u64>) -> ProgressBar {
    let progress = match sampled_total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {percent:>3}% {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
                )
                .unwrap(),
            );
            bar
        }
        None => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan.bold} [{elapsed_precise}] frames {pos}",
                )
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            spinner
        }
    };
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}
