//! Construction helpers for the ffmpeg invocations of the pipeline.
//!
//! Crop detection, the desync check and the screenshot stage all start from
//! the same quiet ffmpeg command and attach a comma-joined `-vf` graph built
//! with `VideoFilterChain`. Frame selection uses the `select` filter, whose
//! commas must be escaped inside a filtergraph.

use ffmpeg_sidecar::command::FfmpegCommand;

/// Base ffmpeg command: no banner, and `-y` unless disabled for runs that
/// write no output file.
pub struct FfmpegCommandBuilder {
    cmd: FfmpegCommand,
    overwrite: bool,
}

impl Default for FfmpegCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCommandBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cmd: FfmpegCommand::new(),
            overwrite: true,
        }
    }

    /// Analysis runs that write to the null muxer pass `false`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn build(mut self) -> FfmpegCommand {
        self.cmd.arg("-hide_banner");
        if self.overwrite {
            self.cmd.arg("-y");
        }
        self.cmd
    }
}

/// Ordered `-vf` graph. Empty stages are skipped so an uncropped source
/// produces no crop entry.
#[derive(Default)]
pub struct VideoFilterChain {
    stages: Vec<String>,
}

impl VideoFilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `crop=w:h:x:y` expression; `""` means no crop.
    #[must_use]
    pub fn add_crop(self, crop: &str) -> Self {
        self.push(crop.to_string())
    }

    #[must_use]
    pub fn add_filter(self, filter: String) -> Self {
        self.push(filter)
    }

    fn push(mut self, stage: String) -> Self {
        if !stage.is_empty() {
            self.stages.push(stage);
        }
        self
    }

    /// The joined graph, or `None` when no stage was added.
    #[must_use]
    pub fn build(self) -> Option<String> {
        (!self.stages.is_empty()).then(|| self.stages.join(","))
    }
}

/// Select expression keeping exactly the given frame indices
/// (`eq(n\,10)+eq(n\,20)`).
#[must_use]
pub fn select_frames_expr(frames: &[u64]) -> String {
    let terms: Vec<String> = frames.iter().map(|n| format!("eq(n\\,{n})")).collect();
    format!("select={}", terms.join("+"))
}

/// Select expression keeping the inclusive frame range `start..=end`.
#[must_use]
pub fn select_range_expr(start: u64, end: u64) -> String {
    format!("select=between(n\\,{start}\\,{end})")
}
