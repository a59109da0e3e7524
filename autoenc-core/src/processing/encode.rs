//! x264 encoding through a VapourSynth frame server.
//!
//! The source is served by `vspipe --y4m` from a generated script and piped
//! into `x264`. Probe encodes use the same path restricted to a frame window.

use crate::cancel::CancellationToken;
use crate::error::CoreResult;
use crate::external::{ProcessRunner, ToolCommand};
use crate::media::FrameRate;
use crate::processing::crop_detection::CropBox;
use std::path::{Path, PathBuf};

/// Reference frame count for a given source width.
#[must_use]
pub fn ref_frames_for_width(width: u32) -> u32 {
    match width {
        w if w >= 1080 => 4,
        w if w >= 720 => 9,
        w if w >= 576 => 12,
        _ => 16,
    }
}

/// Inclusive frame range served to a probe encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeWindow {
    pub start: u64,
    pub end: u64,
}

impl ProbeWindow {
    /// Places a `len`-frame window at `preferred_start`, shifting it back so it
    /// ends on the last frame when the source is too short. A source shorter
    /// than the window is probed whole.
    #[must_use]
    pub fn place(total_frames: u64, len: u64, preferred_start: u64) -> Self {
        let last = total_frames.saturating_sub(1);
        if total_frames <= len {
            return Self { start: 0, end: last };
        }
        let start = preferred_start.min(total_frames - len);
        Self {
            start,
            end: start + len - 1,
        }
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Generated VapourSynth script feeding the encoder.
#[derive(Debug, Clone)]
pub struct FrameServerScript {
    pub source: PathBuf,
    pub crop: CropBox,
}

impl FrameServerScript {
    pub fn new(source: &Path, crop: CropBox) -> Self {
        Self {
            source: source.to_path_buf(),
            crop,
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut script = String::from("import vapoursynth as vs\ncore = vs.core\n");
        script.push_str(&format!(
            "clip = core.ffms2.Source(source={})\n",
            python_string_literal(&self.source.to_string_lossy())
        ));
        if let Some(crop) = self.crop.vapoursynth_crop("clip") {
            script.push_str(&format!("clip = {crop}\n"));
        }
        script.push_str("clip.set_output()\n");
        script
    }

    /// Writes the script to `path`.
    pub fn write_to(&self, path: &Path) -> CoreResult<()> {
        std::fs::write(path, self.render())?;
        log::debug!("Wrote frame server script to {}", path.display());
        Ok(())
    }
}

/// Quotes `value` as a single-quoted Python string literal.
fn python_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// x264 parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct X264Settings {
    pub preset: String,
    pub quality: f64,
    pub ref_frames: u32,
    pub frame_rate: FrameRate,
}

impl X264Settings {
    /// Arguments for encoding y4m from stdin into `output`.
    pub fn args(&self, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "--log-level", "error",
            "--demuxer", "y4m",
            "--level", "4.1",
            "--b-adapt", "2",
            "--vbv-bufsize", "78125",
            "--vbv-maxrate", "62500",
            "--rc-lookahead", "250",
            "--me", "tesa",
            "--direct", "auto",
            "--subme", "11",
            "--trellis", "2",
            "--no-dct-decimate",
            "--no-fast-pskip",
            "--min-keyint", "24",
            "--aq-mode", "2",
            "--qcomp", "0.62",
            "--psy-rd", "30",
            "--bframes", "16",
            "--deblock", "-1:-1:-1",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        args.extend([
            "--fps".to_string(),
            self.frame_rate.to_string(),
            "--preset".to_string(),
            self.preset.clone(),
            "--ref".to_string(),
            self.ref_frames.to_string(),
            "--crf".to_string(),
            format_quality(self.quality),
            "--output".to_string(),
            output.to_string_lossy().into_owned(),
            "-".to_string(),
        ]);
        args
    }

    pub fn command(&self, output: &Path) -> ToolCommand {
        ToolCommand::new("x264").args(self.args(output))
    }
}

/// Formats a quality value the way x264 accepts it (`20`, `21.5`).
#[must_use]
pub fn format_quality(quality: f64) -> String {
    format!("{}", (quality * 10.0).round() / 10.0)
}

/// `vspipe --y4m [-s start -e end] <script> -`
pub fn vspipe_command(script: &Path, window: Option<ProbeWindow>) -> ToolCommand {
    let mut cmd = ToolCommand::new("vspipe").arg("--y4m");
    if let Some(window) = window {
        cmd = cmd
            .arg("-s")
            .arg(window.start.to_string())
            .arg("-e")
            .arg(window.end.to_string());
    }
    cmd.arg(script.as_os_str()).arg("-")
}

/// Runs `vspipe | x264` and writes the elementary stream to `output`.
pub fn encode<R: ProcessRunner>(
    runner: &R,
    script: &Path,
    settings: &X264Settings,
    window: Option<ProbeWindow>,
    output: &Path,
    token: &CancellationToken,
) -> CoreResult<()> {
    let producer = vspipe_command(script, window);
    let consumer = settings.command(output);
    runner.run_piped(&producer, &consumer, token)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::{MockProcessRunner, RecordedRun};

    #[test]
    fn test_ref_frames_tiers() {
        assert_eq!(ref_frames_for_width(1920), 4);
        assert_eq!(ref_frames_for_width(1080), 4);
        assert_eq!(ref_frames_for_width(1079), 9);
        assert_eq!(ref_frames_for_width(720), 9);
        assert_eq!(ref_frames_for_width(576), 12);
        assert_eq!(ref_frames_for_width(480), 16);
        assert_eq!(ref_frames_for_width(320), 16);
    }

    #[test]
    fn test_probe_window_preferred_start() {
        let w = ProbeWindow::place(100_000, 500, 2880);
        assert_eq!(w, ProbeWindow { start: 2880, end: 3379 });
        assert_eq!(w.frames(), 500);
    }

    #[test]
    fn test_probe_window_shifted_back() {
        let w = ProbeWindow::place(3000, 500, 2880);
        assert_eq!(w, ProbeWindow { start: 2500, end: 2999 });
    }

    #[test]
    fn test_probe_window_short_source() {
        let w = ProbeWindow::place(300, 500, 2880);
        assert_eq!(w, ProbeWindow { start: 0, end: 299 });
    }

    #[test]
    fn test_script_with_crop_and_quoted_path() {
        let crop = CropBox { left: 0, right: 0, top: 140, bottom: 140 };
        let script = FrameServerScript::new(Path::new("/media/It's a \\ test.mkv"), crop).render();

        assert!(script.contains("core.ffms2.Source(source='/media/It\\'s a \\\\ test.mkv')"));
        assert!(script.contains("clip = core.std.Crop(clip, left=0, right=0, top=140, bottom=140)"));
        assert!(script.ends_with("clip.set_output()\n"));
    }

    #[test]
    fn test_script_without_crop() {
        let script = FrameServerScript::new(Path::new("/m.mkv"), CropBox::NONE).render();
        assert!(!script.contains("Crop"));
    }

    #[test]
    fn test_x264_args() {
        let settings = X264Settings {
            preset: "veryslow".to_string(),
            quality: 21.5,
            ref_frames: 4,
            frame_rate: FrameRate { num: 24000, den: 1001 },
        };
        let args = settings.args(Path::new("/tmp/probe.mkv"));

        let pair = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(pair("--crf"), "21.5");
        assert_eq!(pair("--ref"), "4");
        assert_eq!(pair("--fps"), "24000/1001");
        assert_eq!(pair("--preset"), "veryslow");
        assert_eq!(pair("--output"), "/tmp/probe.mkv");
        assert_eq!(pair("--psy-rd"), "30");
        assert_eq!(pair("--deblock"), "-1:-1:-1");
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_format_quality() {
        assert_eq!(format_quality(20.0), "20");
        assert_eq!(format_quality(22.14), "22.1");
    }

    #[test]
    fn test_encode_pipes_vspipe_into_x264() {
        let runner = MockProcessRunner::new();
        let settings = X264Settings {
            preset: "veryslow".to_string(),
            quality: 20.0,
            ref_frames: 4,
            frame_rate: FrameRate { num: 25, den: 1 },
        };
        let token = CancellationToken::new();
        let window = Some(ProbeWindow { start: 2880, end: 3379 });
        let out = tempfile::tempdir().unwrap();
        encode(&runner, Path::new("/s/frameserver.vpy"), &settings, window, &out.path().join("p.mkv"), &token).unwrap();

        match &runner.calls()[0] {
            RecordedRun::Piped(producer, consumer) => {
                assert_eq!(
                    producer.args_lossy(),
                    vec!["--y4m", "-s", "2880", "-e", "3379", "/s/frameserver.vpy", "-"]
                );
                assert_eq!(consumer.program, "x264");
            }
            other => panic!("expected a piped run, got {other:?}"),
        }
    }
}
