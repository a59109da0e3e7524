//! Source video metadata.
//!
//! `MediaDescriptor` is produced once by the media probe at pipeline start and
//! is read-only afterwards. It drives reference-frame tiering, probe window
//! placement and screenshot positions.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Frame rate as an exact rational, e.g. 24000/1001.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            None
        } else {
            Some(Self { num, den })
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Value for mkvmerge `--default-duration`, e.g. `0:24000/1001p`.
    #[must_use]
    pub fn mkvmerge_default_duration(&self) -> String {
        format!("0:{self}p")
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for FrameRate {
    type Err = CoreError;

    /// Parses ffprobe's `r_frame_rate` form (`30000/1001`) or a plain number (`25`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::FfprobeParse(format!("invalid frame rate '{s}'"));

        let (num, den) = match s.trim().split_once('/') {
            Some((n, d)) => (
                n.trim().parse::<u32>().map_err(|_| invalid())?,
                d.trim().parse::<u32>().map_err(|_| invalid())?,
            ),
            None => (s.trim().parse::<u32>().map_err(|_| invalid())?, 1),
        };

        FrameRate::new(num, den).ok_or_else(invalid)
    }
}

/// Width, height, frame count, frame rate and bit depth of the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaDescriptor {
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
    pub frame_rate: FrameRate,
    pub bit_depth: u8,
}

/// Infers bit depth from an ffmpeg pixel format name (`yuv420p10le` -> 10).
#[must_use]
pub fn bit_depth_from_pix_fmt(pix_fmt: &str) -> u8 {
    let trimmed = pix_fmt.trim_end_matches("le").trim_end_matches("be");
    let digits: String = trimmed
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    match digits.parse::<u8>() {
        // "yuv420p" ends in the chroma layout digits only when no depth suffix exists
        Ok(depth @ (9 | 10 | 12 | 14 | 16)) if trimmed.ends_with(&format!("p{digits}")) => depth,
        _ => 8,
    }
}
