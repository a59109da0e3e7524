//! Frame offset detection between the source and the encoded output.
//!
//! One reference frame is taken from the (cropped) source at an anchor
//! position, and a window of frames around the same position is taken from
//! the encoded output. Each candidate is scored against the reference with
//! ffmpeg's `psnr` filter; the best-scoring candidate gives the offset.

use crate::cancel::CancellationToken;
use crate::config::DesyncConfig;
use crate::error::{CoreError, CoreResult, DesyncError};
use crate::external::ffmpeg_builder::{select_frames_expr, select_range_expr};
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, VideoFilterChain, run_ffmpeg};
use crate::processing::crop_detection::CropBox;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Similarity of a candidate frame to the reference.
///
/// Identical frames have unbounded PSNR, which outranks every finite score.
#[derive(Debug, Clone, Copy)]
pub enum Score {
    Finite(f64),
    Unbounded,
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Score::Unbounded, Score::Unbounded) => Ordering::Equal,
            (Score::Unbounded, Score::Finite(_)) => Ordering::Greater,
            (Score::Finite(_), Score::Unbounded) => Ordering::Less,
            (Score::Finite(a), Score::Finite(b)) => a.total_cmp(b),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Finite(v) => write!(f, "{v:.2} dB"),
            Score::Unbounded => f.write_str("inf"),
        }
    }
}

/// One candidate offset and its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCandidate {
    pub offset: i64,
    pub score: Score,
}

/// Result of the desync check as reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesyncOutcome {
    InSync,
    Drift(i64),
    /// Detection failed; downstream stages assume no drift.
    Unavailable(String),
}

impl DesyncOutcome {
    pub fn from_offset(offset: i64) -> Self {
        if offset == 0 {
            DesyncOutcome::InSync
        } else {
            DesyncOutcome::Drift(offset)
        }
    }

    /// Offset to apply to encoded frame positions.
    #[must_use]
    pub fn offset(&self) -> i64 {
        match self {
            DesyncOutcome::Drift(offset) => *offset,
            DesyncOutcome::InSync | DesyncOutcome::Unavailable(_) => 0,
        }
    }
}

impl fmt::Display for DesyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesyncOutcome::InSync => f.write_str("in sync"),
            DesyncOutcome::Drift(offset) => write!(f, "{offset:+} frame(s)"),
            DesyncOutcome::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Extracts the value after `average:` from psnr filter output.
///
/// Returns `None` when no line carries a readable average.
pub fn parse_psnr_score<S: AsRef<str>>(lines: &[S]) -> Option<Score> {
    lines.iter().rev().find_map(|line| {
        let line = line.as_ref();
        let start = line.find("average:")? + "average:".len();
        let value = line[start..].split_whitespace().next()?;

        if value.eq_ignore_ascii_case("inf") {
            return Some(Score::Unbounded);
        }
        match value.parse::<f64>() {
            Ok(v) if v.is_infinite() && v > 0.0 => Some(Score::Unbounded),
            Ok(v) if v.is_finite() => Some(Score::Finite(v)),
            _ => None,
        }
    })
}

/// Offset of the highest-scoring candidate; the smallest offset wins ties.
pub fn best_offset(candidates: &[SyncCandidate]) -> Option<i64> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|c| c.offset);

    sorted
        .into_iter()
        .fold(None, |best: Option<SyncCandidate>, c| match best {
            Some(b) if c.score <= b.score => Some(b),
            _ => Some(c),
        })
        .map(|c| c.offset)
}

/// Locates the frame offset between a source and its encode.
#[derive(Debug, Clone)]
pub struct DesyncDetector {
    config: DesyncConfig,
}

impl DesyncDetector {
    pub fn new(config: DesyncConfig) -> Self {
        Self { config }
    }

    /// Anchor frame for a clip of `total_frames`; moved to the middle of the
    /// clip when the configured anchor's window does not fit.
    #[must_use]
    pub fn anchor_for(&self, total_frames: u64) -> u64 {
        if self.config.anchor_frame + self.config.radius < total_frames {
            self.config.anchor_frame
        } else {
            total_frames / 2
        }
    }

    /// Inclusive candidate window around `anchor`, limited to the clip.
    fn window(&self, anchor: u64, total_frames: u64) -> (u64, u64) {
        let start = anchor.saturating_sub(self.config.radius);
        let end = (anchor + self.config.radius).min(total_frames.saturating_sub(1));
        (start, end)
    }

    /// Scores every candidate and returns the best offset
    /// (`candidate frame index - anchor`).
    #[allow(clippy::too_many_arguments)]
    pub fn detect<S: FfmpegSpawner>(
        &self,
        spawner: &S,
        source: &Path,
        encoded: &Path,
        crop: CropBox,
        source_size: (u32, u32),
        total_frames: u64,
        work_dir: &Path,
        token: &CancellationToken,
    ) -> CoreResult<i64> {
        let anchor = self.anchor_for(total_frames);
        let (start, end) = self.window(anchor, total_frames);
        log::debug!("Desync check around frame {anchor} (candidates {start}..={end})");

        let reference = work_dir.join("sync_reference.png");
        let mut cmd = FfmpegCommandBuilder::new().build();
        cmd.input(source.to_string_lossy().into_owned());
        cmd.args(["-an", "-sn", "-dn"]);
        if let Some(filter) = VideoFilterChain::new()
            .add_filter(select_frames_expr(&[anchor]))
            .add_crop(&crop.ffmpeg_filter(source_size.0, source_size.1))
            .build()
        {
            cmd.args(["-vf", &filter]);
        }
        cmd.args(["-fps_mode", "passthrough", "-frames:v", "1"]);
        cmd.output(reference.to_string_lossy().into_owned());
        run_ffmpeg(spawner, cmd, token)?;

        if !reference.exists() {
            return Err(DesyncError::InsufficientSamples {
                anchor,
                produced: 0,
            }
            .into());
        }

        let pattern = work_dir.join("sync_candidate_%03d.png");
        let mut cmd = FfmpegCommandBuilder::new().build();
        cmd.input(encoded.to_string_lossy().into_owned());
        cmd.args(["-an", "-sn", "-dn"]);
        cmd.args(["-vf", &select_range_expr(start, end)]);
        cmd.args(["-fps_mode", "passthrough"]);
        cmd.output(pattern.to_string_lossy().into_owned());
        run_ffmpeg(spawner, cmd, token)?;

        let produced = produced_candidates(work_dir, end - start + 1);
        if produced.is_empty() {
            return Err(DesyncError::InsufficientSamples {
                anchor,
                produced: 0,
            }
            .into());
        }

        let mut candidates = Vec::with_capacity(produced.len());
        for (i, path) in produced.iter().enumerate() {
            token.check()?;
            let score = score_candidate(spawner, path, &reference, token)?;
            let offset = (start + i as u64) as i64 - anchor as i64;
            log::debug!("Candidate offset {offset:+}: {score}");
            candidates.push(SyncCandidate { offset, score });
        }

        best_offset(&candidates).ok_or_else(|| {
            DesyncError::InsufficientSamples {
                anchor,
                produced: candidates.len(),
            }
            .into()
        })
    }
}

/// Candidate files written by the extraction, in frame order.
fn produced_candidates(work_dir: &Path, expected: u64) -> Vec<PathBuf> {
    (1..=expected)
        .map(|n| work_dir.join(format!("sync_candidate_{n:03}.png")))
        .take_while(|p| p.exists())
        .collect()
}

fn score_candidate<S: FfmpegSpawner>(
    spawner: &S,
    candidate: &Path,
    reference: &Path,
    token: &CancellationToken,
) -> CoreResult<Score> {
    let mut cmd = FfmpegCommandBuilder::new().with_overwrite(false).build();
    cmd.input(candidate.to_string_lossy().into_owned());
    cmd.input(reference.to_string_lossy().into_owned());
    cmd.args(["-lavfi", "psnr", "-f", "null", "-"]);

    let lines = run_ffmpeg(spawner, cmd, token)?;
    parse_psnr_score(&lines).ok_or_else(|| {
        CoreError::from(DesyncError::Score {
            candidate: candidate.display().to_string(),
            reason: "no psnr average in ffmpeg output".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::{MockFfmpegSpawner, log_event};

    fn psnr_line(avg: &str) -> String {
        format!("[Parsed_psnr_0 @ 0x55] PSNR y:{avg} u:{avg} v:{avg} average:{avg} min:{avg} max:{avg}")
    }

    #[test]
    fn test_score_ordering() {
        assert!(Score::Unbounded > Score::Finite(45.0));
        assert!(Score::Unbounded > Score::Finite(1000.0));
        assert!(Score::Finite(45.0) > Score::Finite(30.5));
        assert_eq!(Score::Unbounded, Score::Unbounded);
    }

    #[test]
    fn test_parse_psnr_score() {
        assert_eq!(parse_psnr_score(&[psnr_line("42.17")]), Some(Score::Finite(42.17)));
        assert_eq!(parse_psnr_score(&[psnr_line("inf")]), Some(Score::Unbounded));
        assert_eq!(parse_psnr_score(&["Input #0, png_pipe"]), None);
        assert_eq!(parse_psnr_score(&["average:nan"]), None);
    }

    #[test]
    fn test_unbounded_beats_finite() {
        let candidates = [
            SyncCandidate { offset: -1, score: Score::Finite(45.0) },
            SyncCandidate { offset: 2, score: Score::Unbounded },
            SyncCandidate { offset: 0, score: Score::Finite(44.0) },
        ];
        assert_eq!(best_offset(&candidates), Some(2));
    }

    #[test]
    fn test_ties_go_to_smallest_offset() {
        let candidates = [
            SyncCandidate { offset: 3, score: Score::Unbounded },
            SyncCandidate { offset: -2, score: Score::Unbounded },
            SyncCandidate { offset: 0, score: Score::Finite(50.0) },
        ];
        assert_eq!(best_offset(&candidates), Some(-2));
        assert_eq!(best_offset(&[]), None);
    }

    #[test]
    fn test_outcome_from_offset() {
        assert_eq!(DesyncOutcome::from_offset(0), DesyncOutcome::InSync);
        assert_eq!(DesyncOutcome::from_offset(-3), DesyncOutcome::Drift(-3));
        assert_eq!(DesyncOutcome::Unavailable("x".into()).offset(), 0);
    }

    #[test]
    fn test_anchor_moves_for_short_clips() {
        let detector = DesyncDetector::new(DesyncConfig::default());
        assert_eq!(detector.anchor_for(10_000), 1710);
        assert_eq!(detector.anchor_for(1000), 500);
        assert_eq!(detector.window(500, 1000), (495, 505));
        assert_eq!(detector.window(2, 4), (0, 3));
    }

    fn expect_extractions(spawner: &MockFfmpegSpawner, candidates: usize) {
        spawner.add_success_expectation("sync_reference.png", vec![], 1);
        spawner.add_success_expectation("sync_candidate_%03d.png", vec![], candidates);
    }

    #[test]
    fn test_detect_in_sync() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempfile::tempdir()?;
        let spawner = MockFfmpegSpawner::new();
        expect_extractions(&spawner, 11);
        // Candidates 1..=11 map to offsets -5..=5; the sixth is identical
        for i in 1..=11 {
            let avg = if i == 6 { "inf".to_string() } else { format!("{}", 30 + i) };
            spawner.add_success_expectation(
                &format!("sync_candidate_{i:03}.png"),
                vec![log_event(&psnr_line(&avg))],
                0,
            );
        }

        let detector = DesyncDetector::new(DesyncConfig::default());
        let token = CancellationToken::new();
        let offset = detector.detect(
            &spawner,
            Path::new("/in/src.mkv"),
            Path::new("/out/enc.mkv"),
            CropBox { left: 0, right: 0, top: 140, bottom: 140 },
            (1920, 1080),
            10_000,
            work.path(),
            &token,
        )?;

        assert_eq!(offset, 0);
        assert_eq!(DesyncOutcome::from_offset(offset), DesyncOutcome::InSync);

        let calls = spawner.get_received_calls();
        // Source side is cropped, encoded side is not
        assert!(calls[0].iter().any(|a| a.contains("select=eq(n\\,1710),crop=1920:800:0:140")));
        assert!(calls[1].iter().any(|a| a == "select=between(n\\,1705\\,1715)"));
        assert!(!calls[1].iter().any(|a| a.contains("crop=")));
        assert_eq!(spawner.count_calls_matching("psnr"), 11);
        Ok(())
    }

    #[test]
    fn test_detect_drift() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempfile::tempdir()?;
        let spawner = MockFfmpegSpawner::new();
        expect_extractions(&spawner, 11);
        for i in 1..=11 {
            let avg = if i == 9 { "48.5" } else { "31.0" };
            spawner.add_success_expectation(
                &format!("sync_candidate_{i:03}.png"),
                vec![log_event(&psnr_line(avg))],
                0,
            );
        }

        let detector = DesyncDetector::new(DesyncConfig::default());
        let token = CancellationToken::new();
        let offset = detector.detect(
            &spawner,
            Path::new("/in/src.mkv"),
            Path::new("/out/enc.mkv"),
            CropBox::NONE,
            (1920, 1080),
            10_000,
            work.path(),
            &token,
        )?;
        assert_eq!(offset, 3);

        // No crop filter at all for the empty crop box
        let calls = spawner.get_received_calls();
        assert!(!calls[0].iter().any(|a| a.contains("crop")));
        Ok(())
    }

    #[test]
    fn test_no_candidates_is_insufficient_samples() -> Result<(), Box<dyn std::error::Error>> {
        let work = tempfile::tempdir()?;
        let spawner = MockFfmpegSpawner::new();
        expect_extractions(&spawner, 0);

        let detector = DesyncDetector::new(DesyncConfig::default());
        let token = CancellationToken::new();
        let result = detector.detect(
            &spawner,
            Path::new("/in/src.mkv"),
            Path::new("/out/enc.mkv"),
            CropBox::NONE,
            (1920, 1080),
            10_000,
            work.path(),
            &token,
        );

        assert!(matches!(
            result,
            Err(CoreError::Desync(DesyncError::InsufficientSamples { anchor: 1710, produced: 0 }))
        ));
        Ok(())
    }
}
