use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Tracks which values were actually passed on the command line so the
/// configuration file only overrides clap defaults, never explicit flags.
#[derive(Debug, Default)]
pub struct CliSources {
    pub image_format_from_cli: bool,
    pub frame_stride_from_cli: bool,
    pub density_threshold_from_cli: bool,
    pub similarity_threshold_from_cli: bool,
    pub confidence_threshold_from_cli: bool,
    pub channel_capacity_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            image_format_from_cli: value_from_cli(matches, "image_format"),
            frame_stride_from_cli: value_from_cli(matches, "frame_stride"),
            density_threshold_from_cli: value_from_cli(matches, "density_threshold"),
            similarity_threshold_from_cli: value_from_cli(matches, "similarity_threshold"),
            confidence_threshold_from_cli: value_from_cli(matches, "confidence_threshold"),
            channel_capacity_from_cli: value_from_cli(matches, "channel_capacity"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "textframe",
    about = "Extract text-dense keyframes from a video",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Lock decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Path to the EAST text-detection model
    #[arg(long = "model", value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Directory receiving keyframe images and the records file
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Encoding for persisted keyframe images
    #[arg(long = "image-format", id = "image_format", value_enum, default_value_t = ImageFormat::Jpeg)]
    pub image_format: ImageFormat,

    /// Print the list of available decoding backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Frame-index interval between sampled frames
    #[arg(
        long = "frame-stride",
        id = "frame_stride",
        default_value_t = 240,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub frame_stride: u64,

    /// Minimum detected text regions (exclusive) for a frame to count as
    /// text-dense
    #[arg(
        long = "density-threshold",
        id = "density_threshold",
        default_value_t = 50
    )]
    pub density_threshold: usize,

    /// Maximum perceptual-hash distance (inclusive) for two frames to share
    /// a run
    #[arg(
        long = "similarity-threshold",
        id = "similarity_threshold",
        default_value_t = 15,
        value_parser = clap::value_parser!(u32).range(0..=64)
    )]
    pub similarity_threshold: u32,

    /// Minimum detector confidence for a text region to be counted
    #[arg(
        long = "confidence-threshold",
        id = "confidence_threshold",
        default_value_t = 0.6
    )]
    pub confidence_threshold: f32,

    /// Filename for the JSON records file inside the output directory
    #[arg(long = "records-file", value_name = "NAME")]
    pub records_file: Option<String>,

    /// Pretty-print the JSON records file
    #[arg(long = "pretty-json", value_name = "BOOL")]
    pub pretty_json: Option<bool>,

    /// Decoder frame queue capacity before applying backpressure
    #[arg(
        long = "channel-capacity",
        id = "channel_capacity",
        value_parser = clap::value_parser!(usize)
    )]
    pub channel_capacity: Option<usize>,

    /// Input video path
    pub input: Option<PathBuf>,
}
