//! Core library for automated x264 transcoding driven by external tools.
//!
//! This crate probes a source, detects crop geometry, extracts the audio and
//! subtitle tracks, optionally searches for the crf that hits a target
//! bitrate, encodes through `vspipe | x264`, remuxes with mkvmerge and checks
//! the result for frame drift.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use autoenc_core::external::{
//!     CommandMediaInfoExecutor, CrateFfprobeExecutor, SidecarSpawner, StdProcessRunner,
//! };
//! use autoenc_core::{CoreConfig, Pipeline, find_processable_files, process_videos};
//! use std::path::PathBuf;
//!
//! let mut config = CoreConfig::new(
//!     PathBuf::from("/path/to/input"),
//!     PathBuf::from("/path/to/output"),
//!     PathBuf::from("/path/to/logs"),
//! );
//! config.target_bitrate_kbps = Some(4000);
//! config.validate().unwrap();
//!
//! let files = find_processable_files(&config.input_dir).unwrap();
//! let (spawner, ffprobe) = (SidecarSpawner, CrateFfprobeExecutor::new());
//! let (mediainfo, runner) = (CommandMediaInfoExecutor, StdProcessRunner);
//! let pipeline = Pipeline::new(&spawner, &ffprobe, &mediainfo, &runner, &config);
//!
//! let report = process_videos(&pipeline, &files, None).unwrap();
//! println!("{} encoded, {} failed", report.completed.len(), report.failed.len());
//! ```

pub mod cancel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod external;
pub mod media;
pub mod processing;
pub mod temp_files;
pub mod terminal;
pub mod utils;

// Re-exports for public API
pub use cancel::CancellationToken;
pub use config::{CoreConfig, CoreConfigBuilder, DesyncConfig, RateMatchConfig};
pub use discovery::find_processable_files;
pub use error::{CoreError, CoreResult, DesyncError};
pub use media::{FrameRate, MediaDescriptor, Track, TrackKind, TrackSet};
pub use processing::{
    BatchReport, CropBox, DesyncOutcome, Pipeline, PipelineStage, PipelineState, RateMatch,
    RateMatcher, RunSummary, process_videos,
};
pub use utils::{format_bytes, format_duration};
