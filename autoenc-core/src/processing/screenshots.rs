//! Side-by-side comparison screenshots.
//!
//! The same `count` evenly spaced positions are captured from the source and
//! the encode. Encoded positions are shifted by the detected desync so both
//! images show the same picture.

use crate::cancel::CancellationToken;
use crate::error::CoreResult;
use crate::external::ffmpeg_builder::select_frames_expr;
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, VideoFilterChain, run_ffmpeg};
use crate::processing::crop_detection::CropBox;
use std::path::{Path, PathBuf};

/// Positions `k * total / (count + 1)` for `k = 1..=count`.
#[must_use]
pub fn screenshot_positions(total_frames: u64, count: usize) -> Vec<u64> {
    let slots = count as u64 + 1;
    (1..=count as u64).map(|k| k * total_frames / slots).collect()
}

/// Shifts positions by `desync`, clamped to `[0, total_frames - 1]`.
#[must_use]
pub fn shifted_positions(positions: &[u64], desync: i64, total_frames: u64) -> Vec<u64> {
    let last = total_frames.saturating_sub(1) as i64;
    positions
        .iter()
        .map(|&p| (p as i64 + desync).clamp(0, last.max(0)) as u64)
        .collect()
}

/// Files written by one screenshot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotSet {
    pub source: Vec<PathBuf>,
    pub encoded: Vec<PathBuf>,
}

impl ScreenshotSet {
    pub fn len(&self) -> usize {
        self.source.len() + self.encoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What to capture.
#[derive(Debug, Clone, Copy)]
pub struct ScreenshotRequest<'a> {
    pub source: &'a Path,
    pub encoded: &'a Path,
    pub crop: CropBox,
    pub source_size: (u32, u32),
    pub total_frames: u64,
    pub desync: i64,
    pub count: usize,
}

/// Writes `source_%d.png` and `encoded_%d.png` into `dir`.
pub fn take_screenshots<S: FfmpegSpawner>(
    spawner: &S,
    request: &ScreenshotRequest<'_>,
    dir: &Path,
    token: &CancellationToken,
) -> CoreResult<ScreenshotSet> {
    if request.count == 0 {
        return Ok(ScreenshotSet::default());
    }
    std::fs::create_dir_all(dir)?;

    let source_positions = screenshot_positions(request.total_frames, request.count);
    let encoded_positions =
        shifted_positions(&source_positions, request.desync, request.total_frames);
    log::debug!("Screenshot positions: source {source_positions:?}, encoded {encoded_positions:?}");

    let crop = request
        .crop
        .ffmpeg_filter(request.source_size.0, request.source_size.1);
    let source = capture(spawner, request.source, &source_positions, &crop, dir, "source", token)?;
    let encoded = capture(spawner, request.encoded, &encoded_positions, "", dir, "encoded", token)?;

    Ok(ScreenshotSet { source, encoded })
}

fn capture<S: FfmpegSpawner>(
    spawner: &S,
    input: &Path,
    positions: &[u64],
    crop: &str,
    dir: &Path,
    prefix: &str,
    token: &CancellationToken,
) -> CoreResult<Vec<PathBuf>> {
    let filter = VideoFilterChain::new()
        .add_filter(select_frames_expr(positions))
        .add_crop(crop)
        .build()
        .unwrap_or_default();

    let mut cmd = FfmpegCommandBuilder::new().build();
    cmd.input(input.to_string_lossy().into_owned());
    cmd.args(["-an", "-sn", "-dn"]);
    cmd.args(["-vf", &filter]);
    cmd.args(["-fps_mode", "passthrough"]);
    cmd.output(dir.join(format!("{prefix}_%d.png")).to_string_lossy().into_owned());
    run_ffmpeg(spawner, cmd, token)?;

    Ok((1..=positions.len())
        .map(|n| dir.join(format!("{prefix}_{n}.png")))
        .filter(|p| p.exists())
        .collect())
}
