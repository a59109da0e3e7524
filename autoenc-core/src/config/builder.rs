// ============================================================================
// autoenc-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent API for creating CoreConfig instances. Required paths are checked and
// the finished configuration is validated in `build`.

use std::path::PathBuf;

use super::{CoreConfig, DesyncConfig, RateMatchConfig};
use crate::error::{CoreError, CoreResult};

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use autoenc_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .input_dir(PathBuf::from("/path/to/input"))
///     .output_dir(PathBuf::from("/path/to/output"))
///     .log_dir(PathBuf::from("/path/to/logs"))
///     .encoder_preset("slow")
///     .crop_mode("none")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.encoder_preset, "slow");
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfigBuilder {
    // Required fields
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,

    // Everything else starts from CoreConfig::default()
    base: CoreConfig,
}

impl Default for CoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreConfigBuilder {
    /// Creates a new CoreConfigBuilder with default values.
    pub fn new() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            log_dir: None,
            base: CoreConfig::default(),
        }
    }

    /// Sets the input directory.
    pub fn input_dir(mut self, input_dir: PathBuf) -> Self {
        self.input_dir = Some(input_dir);
        self
    }

    /// Sets the output directory.
    pub fn output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = Some(output_dir);
        self
    }

    /// Sets the log directory.
    pub fn log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }

    /// Sets the base directory for per-run scratch areas.
    pub fn temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.base.temp_dir = Some(temp_dir);
        self
    }

    /// Sets the x264 speed preset.
    pub fn encoder_preset(mut self, preset: &str) -> Self {
        self.base.encoder_preset = preset.to_string();
        self
    }

    /// Sets the crf used when no target bitrate is requested.
    pub fn default_quality(mut self, quality: f64) -> Self {
        self.base.default_quality = quality;
        self
    }

    /// Sets the crop mode ("auto" or "none").
    pub fn crop_mode(mut self, mode: &str) -> Self {
        self.base.crop_mode = mode.to_string();
        self
    }

    /// Sets the crop significance threshold in pixels.
    pub fn crop_threshold(mut self, threshold: u32) -> Self {
        self.base.crop_threshold = threshold;
        self
    }

    /// Requests bitrate matching against the given target.
    pub fn target_bitrate_kbps(mut self, target: u64) -> Self {
        self.base.target_bitrate_kbps = Some(target);
        self
    }

    /// Sets the probe window length in frames.
    pub fn probe_frames(mut self, frames: u64) -> Self {
        self.base.rate_match.probe_frames = frames;
        self
    }

    /// Sets the maximum number of probe encodes.
    pub fn max_probes(mut self, probes: usize) -> Self {
        self.base.rate_match.max_probes = probes;
        self
    }

    /// Replaces the whole bitrate search configuration.
    pub fn rate_match(mut self, rate_match: RateMatchConfig) -> Self {
        self.base.rate_match = rate_match;
        self
    }

    /// Replaces the desync detection configuration.
    pub fn desync(mut self, desync: DesyncConfig) -> Self {
        self.base.desync = desync;
        self
    }

    /// Sets the number of screenshots per side (0 disables screenshots).
    pub fn screenshot_count(mut self, count: usize) -> Self {
        self.base.screenshot_count = count;
        self
    }

    /// Sets the screenshot directory.
    pub fn screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.base.screenshot_dir = Some(dir);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// * `CoreError::InvalidConfig` if a required path is missing or a value is out of range
    pub fn build(self) -> CoreResult<CoreConfig> {
        let missing = |name: &str| CoreError::InvalidConfig(format!("{name} is required"));

        let config = CoreConfig {
            input_dir: self.input_dir.ok_or_else(|| missing("input_dir"))?,
            output_dir: self.output_dir.ok_or_else(|| missing("output_dir"))?,
            log_dir: self.log_dir.ok_or_else(|| missing("log_dir"))?,
            ..self.base
        };

        config.validate()?;
        Ok(config)
    }
}
