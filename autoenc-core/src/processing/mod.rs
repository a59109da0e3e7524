//! Core video processing logic and orchestration.
//!
//! This module serves as the central hub for the processing logic of the
//! autoenc-core library. Each pipeline stage lives in its own submodule;
//! `pipeline` sequences them for one file and for a batch.

/// Per-file orchestration and batch processing
pub mod pipeline;

/// Crop detection via ffmpeg cropdetect
pub mod crop_detection;

/// Track extraction and remuxing (mkvextract / mkvmerge)
pub mod tracks;

/// vspipe | x264 encoding
pub mod encode;

/// Bitrate search over the quality parameter
pub mod rate_match;

/// Frame offset detection between source and encode
pub mod desync;

/// Comparison screenshots
pub mod screenshots;

pub use crop_detection::{CropBox, detect_crop};
pub use desync::{DesyncDetector, DesyncOutcome, Score};
pub use pipeline::{
    BatchReport, Pipeline, PipelineContext, PipelineStage, PipelineState, RunSummary,
    process_videos, resolve_output_path,
};
pub use rate_match::{ProbeResult, RateMatch, RateMatcher};
pub use screenshots::ScreenshotSet;
