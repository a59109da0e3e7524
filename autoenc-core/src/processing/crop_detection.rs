//! Black bar detection and crop geometry.
//!
//! ffmpeg's `cropdetect` runs over the first minutes of the source (sampled at
//! 5 fps). Its running estimate converges as it sees more frames, so the last
//! reported rectangle is used. Margins that are all below the significance
//! threshold collapse to "no crop".

use crate::cancel::CancellationToken;
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegCommandBuilder, FfmpegSpawner, run_ffmpeg};
use crate::media::MediaDescriptor;
use std::fmt;
use std::path::Path;

/// Pixels removed from each edge of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropBox {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropBox {
    /// The empty crop.
    pub const NONE: CropBox = CropBox {
        left: 0,
        right: 0,
        top: 0,
        bottom: 0,
    };

    /// Converts a cropdetect rectangle (`w:h:x:y`) into edge margins for a
    /// `width` x `height` frame.
    pub fn from_rect(rect: CropRect, width: u32, height: u32) -> CoreResult<Self> {
        if rect.w == 0 || rect.h == 0 || rect.x + rect.w > width || rect.y + rect.h > height {
            return Err(CoreError::CropDetection(format!(
                "crop {rect} does not fit a {width}x{height} frame"
            )));
        }

        Ok(Self {
            left: rect.x,
            right: width - rect.w - rect.x,
            top: rect.y,
            bottom: height - rect.h - rect.y,
        })
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Returns `NONE` when every margin is below `threshold` pixels.
    #[must_use]
    pub fn collapse_below(self, threshold: u32) -> Self {
        let margins = [self.left, self.right, self.top, self.bottom];
        if margins.iter().all(|m| *m < threshold) {
            Self::NONE
        } else {
            self
        }
    }

    /// Frame size after cropping.
    #[must_use]
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.saturating_sub(self.left + self.right),
            height.saturating_sub(self.top + self.bottom),
        )
    }

    /// ffmpeg filter expression (`crop=w:h:x:y`); empty for the empty crop so
    /// that `VideoFilterChain::add_crop` adds nothing.
    #[must_use]
    pub fn ffmpeg_filter(&self, width: u32, height: u32) -> String {
        if self.is_none() {
            return String::new();
        }
        let (w, h) = self.output_size(width, height);
        format!("crop={w}:{h}:{}:{}", self.left, self.top)
    }

    /// VapourSynth `std.Crop` call applied to `clip`, or `None` for the empty crop.
    #[must_use]
    pub fn vapoursynth_crop(&self, clip: &str) -> Option<String> {
        if self.is_none() {
            return None;
        }
        Some(format!(
            "core.std.Crop({clip}, left={}, right={}, top={}, bottom={})",
            self.left, self.right, self.top, self.bottom
        ))
    }
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(
                f,
                "left={} right={} top={} bottom={}",
                self.left, self.right, self.top, self.bottom
            )
        }
    }
}

/// A `crop=w:h:x:y` rectangle as reported by cropdetect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub w: u32,
    pub h: u32,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.w, self.h, self.x, self.y)
    }
}

/// Settings for one crop detection run.
#[derive(Debug, Clone, Copy)]
pub struct CropDetectionSettings {
    /// Seconds of the source to analyse
    pub sample_secs: u32,
    /// Margins below this on every side mean "no crop"
    pub threshold: u32,
}

/// Detects the crop box of `input_file`.
///
/// # Errors
///
/// `CropDetection` when ffmpeg reports no crop line at all, plus any ffmpeg
/// process error.
pub fn detect_crop<S: FfmpegSpawner>(
    spawner: &S,
    input_file: &Path,
    descriptor: &MediaDescriptor,
    settings: CropDetectionSettings,
    token: &CancellationToken,
) -> CoreResult<CropBox> {
    let mut cmd = FfmpegCommandBuilder::new().with_overwrite(false).build();
    cmd.input(input_file.to_string_lossy().into_owned());
    cmd.args(["-an", "-sn"]);
    cmd.args(["-vf", "fps=fps=5,cropdetect"]);
    cmd.args(["-t", &settings.sample_secs.to_string()]);
    cmd.args(["-f", "null", "-"]);

    let lines = run_ffmpeg(spawner, cmd, token)?;
    let rect = parse_crop_from_output(&lines).ok_or_else(|| {
        CoreError::CropDetection(format!(
            "cropdetect reported no crop for {}",
            input_file.display()
        ))
    })?;

    let crop = CropBox::from_rect(rect, descriptor.width, descriptor.height)?
        .collapse_below(settings.threshold);

    log::debug!("cropdetect rectangle {rect}, using crop: {crop}");
    Ok(crop)
}

/// Returns the last valid `crop=w:h:x:y` value in the output lines.
pub fn parse_crop_from_output<S: AsRef<str>>(lines: &[S]) -> Option<CropRect> {
    lines.iter().rev().find_map(|line| {
        let line = line.as_ref();
        let crop_pos = line.rfind("crop=")?;
        let crop_part = &line[crop_pos + 5..];
        let end_pos = crop_part
            .find(char::is_whitespace)
            .unwrap_or(crop_part.len());
        parse_crop_value(&crop_part[..end_pos])
    })
}

/// Parses `w:h:x:y` with exactly four unsigned integers.
fn parse_crop_value(crop: &str) -> Option<CropRect> {
    let parts: Vec<u32> = crop
        .split(':')
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts[..] {
        [w, h, x, y] => Some(CropRect { w, h, x, y }),
        _ => None,
    }
}

/// Whether `crop` is a well-formed `w:h:x:y` value.
pub fn is_valid_crop_format(crop: &str) -> bool {
    parse_crop_value(crop).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mocks::{MockFfmpegSpawner, log_event};
    use crate::media::FrameRate;

    fn descriptor() -> MediaDescriptor {
        MediaDescriptor {
            width: 1920,
            height: 1080,
            total_frames: 10_000,
            frame_rate: FrameRate { num: 24000, den: 1001 },
            bit_depth: 8,
        }
    }

    const SETTINGS: CropDetectionSettings = CropDetectionSettings {
        sample_secs: 240,
        threshold: 16,
    };

    #[test]
    fn test_is_valid_crop_format() {
        assert!(is_valid_crop_format("1920:1080:0:0"));
        assert!(is_valid_crop_format("1920:800:0:140"));
        assert!(!is_valid_crop_format("1920:1080:0"));
        assert!(!is_valid_crop_format("1920:1080:0:0:0"));
        assert!(!is_valid_crop_format(""));
        assert!(!is_valid_crop_format("1920:1080:0:-10"));
        assert!(!is_valid_crop_format("1920.5:1080:0:0"));
    }

    #[test]
    fn test_parse_crop_takes_last_line() {
        let output = [
            "[Parsed_cropdetect_1 @ 0x7f8] x1:0 x2:1919 y1:0 y2:1079 w:1920 h:1080 x:0 y:0 pts:0 t:0.000000 crop=1920:1080:0:0",
            "frame=  100 fps=0.0 q=-0.0 size=N/A time=00:00:20.00 bitrate=N/A",
            "[Parsed_cropdetect_1 @ 0x7f8] x1:0 x2:1919 y1:140 y2:939 w:1920 h:800 x:0 y:140 pts:9 t:1.8 crop=1920:800:0:140",
        ];
        assert_eq!(
            parse_crop_from_output(&output),
            Some(CropRect { w: 1920, h: 800, x: 0, y: 140 })
        );
    }

    #[test]
    fn test_parse_crop_none_found() {
        let output = ["Stream #0:0: Video: h264", "crop=garbage"];
        assert_eq!(parse_crop_from_output(&output), None);
    }

    #[test]
    fn test_crop_box_from_rect() {
        let crop =
            CropBox::from_rect(CropRect { w: 1920, h: 800, x: 0, y: 140 }, 1920, 1080).unwrap();
        assert_eq!(crop, CropBox { left: 0, right: 0, top: 140, bottom: 140 });
        assert_eq!(crop.ffmpeg_filter(1920, 1080), "crop=1920:800:0:140");
        assert_eq!(
            crop.vapoursynth_crop("clip").as_deref(),
            Some("core.std.Crop(clip, left=0, right=0, top=140, bottom=140)")
        );
    }

    #[test]
    fn test_crop_rect_outside_frame_rejected() {
        let result = CropBox::from_rect(CropRect { w: 1920, h: 800, x: 10, y: 0 }, 1920, 1080);
        assert!(matches!(result, Err(CoreError::CropDetection(_))));
    }

    #[test]
    fn test_small_margins_collapse() {
        let crop = CropBox { left: 0, right: 0, top: 8, bottom: 8 }.collapse_below(16);
        assert!(crop.is_none());

        let crop = CropBox { left: 0, right: 0, top: 8, bottom: 20 }.collapse_below(16);
        assert_eq!(crop.bottom, 20);
    }

    #[test]
    fn test_empty_crop_emits_nothing() {
        assert_eq!(CropBox::NONE.ffmpeg_filter(1920, 1080), "");
        assert_eq!(CropBox::NONE.vapoursynth_crop("clip"), None);
        assert_eq!(CropBox::NONE.output_size(1920, 1080), (1920, 1080));
    }

    #[test]
    fn test_detect_crop_runs_cropdetect() {
        let spawner = MockFfmpegSpawner::new();
        spawner.add_success_expectation(
            "cropdetect",
            vec![log_event("[Parsed_cropdetect_1 @ 0x1] crop=1920:800:0:140")],
            0,
        );

        let token = CancellationToken::new();
        let crop =
            detect_crop(&spawner, Path::new("/in/movie.mkv"), &descriptor(), SETTINGS, &token)
                .unwrap();
        assert_eq!(crop.top, 140);

        let args = &spawner.get_received_calls()[0];
        assert!(args.contains(&"fps=fps=5,cropdetect".to_string()));
        assert!(args.contains(&"240".to_string()));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_detect_crop_without_output_fails() {
        let spawner = MockFfmpegSpawner::new();
        spawner.add_success_expectation("cropdetect", vec![log_event("nothing useful")], 0);

        let token = CancellationToken::new();
        let result =
            detect_crop(&spawner, Path::new("/in/movie.mkv"), &descriptor(), SETTINGS, &token);
        assert!(matches!(result, Err(CoreError::CropDetection(_))));
    }
}
