// autoenc-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "autoenc: automated x264 encoding tool",
    long_about = "Probes, crops, encodes (optionally to a target bitrate) and remuxes video files \
                  using ffmpeg, vspipe, x264 and mkvtoolnix."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug output on the console
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encodes a video file, or every video file in a directory
    Encode(EncodeArgs),
}

#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Input file or directory containing video files
    #[arg(short = 'i', long = "input", required = true, value_name = "INPUT_PATH")]
    pub input_path: PathBuf,

    /// Output directory, or output file name when encoding a single file
    /// (defaults to an `encoded` directory next to the input)
    #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Number of comparison screenshots per side (0 disables them)
    #[arg(short = 's', long, value_name = "COUNT", default_value_t = autoenc_core::config::DEFAULT_SCREENSHOT_COUNT)]
    pub screenshots: usize,

    /// Optional: Directory for screenshots (defaults to the output directory)
    #[arg(long, value_name = "DIR")]
    pub screenshot_dir: Option<PathBuf>,

    // --- Rate Control ---
    /// Target video bitrate in kbps; enables the probe-encode search for a matching crf
    #[arg(long, value_name = "KBPS", value_parser = clap::value_parser!(u64).range(1..))]
    pub target_rate: Option<u64>,

    /// Probe encode length in frames (must be greater than 1)
    #[arg(long, value_name = "FRAMES", value_parser = clap::value_parser!(u64).range(2..))]
    pub probe_frames: Option<u64>,

    /// Maximum number of probe encodes
    #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u64).range(1..=20))]
    pub max_probes: Option<u64>,

    /// Optional: crf used when no target bitrate is given
    #[arg(long, value_name = "CRF")]
    pub quality: Option<f64>,

    /// Optional: Override the x264 preset
    #[arg(long, value_name = "PRESET")]
    pub preset: Option<String>,

    /// Disable automatic crop detection (uses ffmpeg's cropdetect)
    #[arg(long)]
    pub disable_autocrop: bool,

    // --- Logging and Scratch Space ---
    /// Optional: Directory for log files (defaults to OUTPUT_DIR/logs)
    #[arg(short, long, value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Do not write a run log file
    #[arg(long, default_value_t = false)]
    pub no_log: bool,

    /// Optional: Base directory for per-run scratch files (defaults to the output directory)
    #[arg(long, value_name = "DIR", env = "AUTOENC_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}
