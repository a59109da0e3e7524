//! Configuration structures and constants for the autoenc-core library.
//!
//! This module provides the configuration system for a pipeline run: paths,
//! encoder settings, bitrate matching, desync detection and screenshots.

mod builder;

use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};

pub use builder::CoreConfigBuilder;

// Default constants

/// Default x264 speed preset used for the final encode and for probes.
pub const DEFAULT_ENCODER_PRESET: &str = "veryslow";

/// Default crf when no target bitrate is requested.
/// Also the starting point of the bitrate search.
pub const DEFAULT_QUALITY: f64 = 20.0;

/// Default crop mode for the main encode.
pub const DEFAULT_CROP_MODE: &str = "auto";

/// Margins below this many pixels on every side are treated as "no crop".
pub const DEFAULT_CROP_THRESHOLD: u32 = 16;

/// Seconds of the source sampled by cropdetect.
pub const DEFAULT_CROP_SAMPLE_SECS: u32 = 240;

/// Fixed increment applied to the quality parameter while the target is not bracketed.
pub const DEFAULT_QUALITY_STEP: f64 = 5.0;

/// Maximum number of probe encodes per bitrate search.
pub const DEFAULT_MAX_PROBES: usize = 4;

/// Length of each probe encode in frames.
pub const DEFAULT_PROBE_FRAMES: u64 = 500;

/// Preferred first frame of the probe window.
pub const DEFAULT_PROBE_START_FRAME: u64 = 2880;

/// Valid x264 crf range.
pub const MIN_QUALITY: f64 = 0.0;
pub const MAX_QUALITY: f64 = 51.0;

/// Frame of the source used as the sync reference.
pub const DEFAULT_SYNC_ANCHOR_FRAME: u64 = 1710;

/// Candidate frames taken on each side of the anchor in the encoded output.
pub const DEFAULT_SYNC_RADIUS: u64 = 5;

/// Number of comparison screenshots per side.
pub const DEFAULT_SCREENSHOT_COUNT: usize = 5;

/// Bitrate search settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RateMatchConfig {
    /// Quality parameter of the first probe
    pub initial_quality: f64,
    /// Step applied while the target bitrate is not bracketed
    pub quality_step: f64,
    /// Upper bound on probe encodes
    pub max_probes: usize,
    /// Probe window length in frames (must be > 1)
    pub probe_frames: u64,
    /// Preferred first frame of the probe window
    pub probe_start_frame: u64,
    /// Lowest quality value the encoder accepts
    pub min_quality: f64,
    /// Highest quality value the encoder accepts
    pub max_quality: f64,
}

impl Default for RateMatchConfig {
    fn default() -> Self {
        Self {
            initial_quality: DEFAULT_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
            max_probes: DEFAULT_MAX_PROBES,
            probe_frames: DEFAULT_PROBE_FRAMES,
            probe_start_frame: DEFAULT_PROBE_START_FRAME,
            min_quality: MIN_QUALITY,
            max_quality: MAX_QUALITY,
        }
    }
}

/// Desync detection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesyncConfig {
    /// Source frame used as the reference
    pub anchor_frame: u64,
    /// Candidates on each side of the anchor
    pub radius: u64,
}

impl Default for DesyncConfig {
    fn default() -> Self {
        Self {
            anchor_frame: DEFAULT_SYNC_ANCHOR_FRAME,
            radius: DEFAULT_SYNC_RADIUS,
        }
    }
}

/// Main configuration structure for the autoenc-core library.
///
/// All fields have sensible defaults, so only the path fields usually need
/// to be set. The builder provides a fluent alternative.
///
/// # Examples
///
/// ```rust,no_run
/// use autoenc_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .input_dir(PathBuf::from("/path/to/input"))
///     .output_dir(PathBuf::from("/path/to/output"))
///     .log_dir(PathBuf::from("/path/to/logs"))
///     .target_bitrate_kbps(4000)
///     .screenshot_count(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory containing input video files to process
    pub input_dir: PathBuf,

    /// Directory where encoded output files will be saved
    pub output_dir: PathBuf,

    /// Directory for log files
    pub log_dir: PathBuf,

    /// Optional base directory for per-run scratch areas (defaults to `output_dir`)
    pub temp_dir: Option<PathBuf>,

    /// x264 speed preset
    pub encoder_preset: String,

    /// crf used when no target bitrate is requested
    pub default_quality: f64,

    /// Crop mode for the main encode ("auto" or "none")
    pub crop_mode: String,

    /// Significance threshold for detected margins, in pixels
    pub crop_threshold: u32,

    /// Seconds of the source analysed by cropdetect
    pub crop_sample_secs: u32,

    /// Target bitrate in kbps; `None` skips the bitrate search entirely
    pub target_bitrate_kbps: Option<u64>,

    pub rate_match: RateMatchConfig,

    pub desync: DesyncConfig,

    /// Screenshots per side; 0 disables the screenshot stage
    pub screenshot_count: usize,

    /// Screenshot base directory; each input gets a `<stem>` subdirectory.
    /// Without it screenshots go to `<output_dir>/<stem>_screenshots`.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            log_dir: PathBuf::from("."),
            temp_dir: None,
            encoder_preset: DEFAULT_ENCODER_PRESET.to_string(),
            default_quality: DEFAULT_QUALITY,
            crop_mode: DEFAULT_CROP_MODE.to_string(),
            crop_threshold: DEFAULT_CROP_THRESHOLD,
            crop_sample_secs: DEFAULT_CROP_SAMPLE_SECS,
            target_bitrate_kbps: None,
            rate_match: RateMatchConfig::default(),
            desync: DesyncConfig::default(),
            screenshot_count: DEFAULT_SCREENSHOT_COUNT,
            screenshot_dir: None,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default settings for the given directories.
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            log_dir,
            ..Self::default()
        }
    }

    /// Whether automatic crop detection should run.
    #[must_use]
    pub fn autocrop_enabled(&self) -> bool {
        !matches!(self.crop_mode.as_str(), "none" | "off")
    }

    /// Checks value ranges. Called by the CLI before any stage runs.
    pub fn validate(&self) -> CoreResult<()> {
        if self.encoder_preset.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "encoder preset must not be empty".to_string(),
            ));
        }

        match self.crop_mode.as_str() {
            "auto" | "none" | "off" => {}
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "unknown crop mode '{other}' (expected 'auto' or 'none')"
                )));
            }
        }

        let rm = &self.rate_match;
        if !(rm.min_quality < rm.max_quality) {
            return Err(CoreError::InvalidConfig(format!(
                "quality range {}..{} is empty",
                rm.min_quality, rm.max_quality
            )));
        }
        for (name, value) in [
            ("default quality", self.default_quality),
            ("initial probe quality", rm.initial_quality),
        ] {
            if !(rm.min_quality..=rm.max_quality).contains(&value) {
                return Err(CoreError::InvalidConfig(format!(
                    "{name} {value} is outside {}..={}",
                    rm.min_quality, rm.max_quality
                )));
            }
        }

        if let Some(target) = self.target_bitrate_kbps {
            if target == 0 {
                return Err(CoreError::InvalidConfig(
                    "target bitrate must be greater than 0".to_string(),
                ));
            }
            if rm.probe_frames <= 1 {
                return Err(CoreError::InvalidConfig(format!(
                    "probe frames must be greater than 1 (got {})",
                    rm.probe_frames
                )));
            }
            if rm.max_probes == 0 {
                return Err(CoreError::InvalidConfig(
                    "at least one probe is required".to_string(),
                ));
            }
            if !(rm.quality_step > 0.0) {
                return Err(CoreError::InvalidConfig(
                    "quality step must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.autocrop_enabled());
        assert_eq!(config.target_bitrate_kbps, None);
        assert_eq!(config.rate_match.max_probes, 4);
        assert_eq!(config.desync.radius, 5);
    }

    #[test]
    fn test_zero_target_rejected() {
        let mut config = CoreConfig::default();
        config.target_bitrate_kbps = Some(0);
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_probe_frames_must_exceed_one() {
        let mut config = CoreConfig::default();
        config.target_bitrate_kbps = Some(4000);
        config.rate_match.probe_frames = 1;
        assert!(config.validate().is_err());

        config.rate_match.probe_frames = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_settings_ignored_without_target() {
        let mut config = CoreConfig::default();
        config.rate_match.probe_frames = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_crop_modes() {
        let mut config = CoreConfig::default();
        config.crop_mode = "none".to_string();
        assert!(config.validate().is_ok());
        assert!(!config.autocrop_enabled());

        config.crop_mode = "sideways".to_string();
        assert!(config.validate().is_err());
    }
}
