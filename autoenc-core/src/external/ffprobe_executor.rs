//! FFprobe integration for source video probing.
//!
//! Runs ffprobe through the `ffprobe` crate (structured JSON) and reduces the
//! first video stream to a `MediaDescriptor`.

use crate::error::{CoreError, CoreResult, command_failed_error, command_start_error};
use crate::media::{FrameRate, MediaDescriptor, bit_depth_from_pix_fmt};
use ffprobe::{FfProbeError, ffprobe};
use std::path::Path;

/// Trait for media probing.
pub trait FfprobeExecutor {
    /// Probes the source and returns its video descriptor.
    fn get_media_descriptor(&self, input_path: &Path) -> CoreResult<MediaDescriptor>;
}

/// `FfprobeExecutor` backed by the `ffprobe` crate.
#[derive(Debug, Clone, Default)]
pub struct CrateFfprobeExecutor;

impl CrateFfprobeExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl FfprobeExecutor for CrateFfprobeExecutor {
    fn get_media_descriptor(&self, input_path: &Path) -> CoreResult<MediaDescriptor> {
        log::debug!(
            "Running ffprobe (via crate) for media descriptor on: {}",
            input_path.display()
        );

        let metadata = ffprobe(input_path).map_err(|err| {
            log::error!("ffprobe failed on {}: {:?}", input_path.display(), err);
            map_ffprobe_error(err, "media descriptor")
        })?;

        let stream = metadata
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| {
                CoreError::VideoInfoError(format!(
                    "No video stream found in {}",
                    input_path.display()
                ))
            })?;

        let raw = RawVideoStream {
            width: stream.width,
            height: stream.height,
            r_frame_rate: &stream.r_frame_rate,
            avg_frame_rate: &stream.avg_frame_rate,
            nb_frames: stream.nb_frames.as_deref(),
            bits_per_raw_sample: stream.bits_per_raw_sample.as_deref(),
            pix_fmt: stream.pix_fmt.as_deref(),
            duration: stream
                .duration
                .as_deref()
                .or(metadata.format.duration.as_deref()),
        };

        let descriptor = raw.into_descriptor()?;
        log::debug!("Media descriptor for {}: {:?}", input_path.display(), descriptor);
        Ok(descriptor)
    }
}

/// The ffprobe stream fields the descriptor is derived from.
#[derive(Debug, Clone, Copy)]
struct RawVideoStream<'a> {
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: &'a str,
    avg_frame_rate: &'a str,
    nb_frames: Option<&'a str>,
    bits_per_raw_sample: Option<&'a str>,
    pix_fmt: Option<&'a str>,
    duration: Option<&'a str>,
}

impl RawVideoStream<'_> {
    fn into_descriptor(self) -> CoreResult<MediaDescriptor> {
        let dimension = |value: Option<i64>, name: &str| -> CoreResult<u32> {
            value
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    CoreError::VideoInfoError(format!("Video stream has invalid {name}: {value:?}"))
                })
        };
        let width = dimension(self.width, "width")?;
        let height = dimension(self.height, "height")?;

        let frame_rate = self
            .r_frame_rate
            .parse::<FrameRate>()
            .or_else(|_| self.avg_frame_rate.parse::<FrameRate>())?;

        let reported_frames = self
            .nb_frames
            .and_then(|n| n.trim().parse::<u64>().ok())
            .filter(|n| *n > 0);

        let total_frames = match reported_frames {
            Some(frames) => frames,
            None => {
                let duration = self
                    .duration
                    .and_then(|d| d.trim().parse::<f64>().ok())
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .ok_or_else(|| {
                        CoreError::FfprobeParse(
                            "neither frame count nor duration reported".to_string(),
                        )
                    })?;
                (duration * frame_rate.as_f64()).round() as u64
            }
        };

        let bit_depth = self
            .bits_per_raw_sample
            .and_then(|b| b.trim().parse::<u8>().ok())
            .filter(|b| *b > 0)
            .unwrap_or_else(|| self.pix_fmt.map_or(8, bit_depth_from_pix_fmt));

        Ok(MediaDescriptor {
            width,
            height,
            total_frames,
            frame_rate,
            bit_depth,
        })
    }
}

fn map_ffprobe_error(err: FfProbeError, context: &str) -> CoreError {
    match err {
        FfProbeError::Io(io_err) => command_start_error(format!("ffprobe ({context})"), io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            command_failed_error(format!("ffprobe ({context})"), output.status, stderr)
        }
        FfProbeError::Deserialize(err) => CoreError::JsonParseError(format!(
            "ffprobe {context} output deserialization: {err}"
        )),
        _ => CoreError::FfprobeParse(format!("Unknown ffprobe error during {context}: {err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw<'a>() -> RawVideoStream<'a> {
        RawVideoStream {
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: "24000/1001",
            avg_frame_rate: "24000/1001",
            nb_frames: Some("34000"),
            bits_per_raw_sample: Some("8"),
            pix_fmt: Some("yuv420p"),
            duration: Some("1418.0"),
        }
    }

    #[test]
    fn test_descriptor_from_reported_fields() {
        let d = raw().into_descriptor().unwrap();
        assert_eq!((d.width, d.height), (1920, 1080));
        assert_eq!(d.total_frames, 34000);
        assert_eq!(d.frame_rate, FrameRate { num: 24000, den: 1001 });
        assert_eq!(d.bit_depth, 8);
    }

    #[test]
    fn test_frame_count_falls_back_to_duration() {
        let stream = RawVideoStream {
            nb_frames: None,
            r_frame_rate: "25/1",
            duration: Some("10.0"),
            ..raw()
        };
        assert_eq!(stream.into_descriptor().unwrap().total_frames, 250);
    }

    #[test]
    fn test_bit_depth_falls_back_to_pix_fmt() {
        let stream = RawVideoStream {
            bits_per_raw_sample: None,
            pix_fmt: Some("yuv420p10le"),
            ..raw()
        };
        assert_eq!(stream.into_descriptor().unwrap().bit_depth, 10);
    }

    #[test]
    fn test_avg_frame_rate_used_when_r_frame_rate_invalid() {
        let stream = RawVideoStream {
            r_frame_rate: "0/0",
            avg_frame_rate: "30000/1001",
            ..raw()
        };
        assert_eq!(stream.into_descriptor().unwrap().frame_rate.num, 30000);
    }

    #[test]
    fn test_missing_dimensions_rejected() {
        let stream = RawVideoStream {
            width: None,
            ..raw()
        };
        assert!(matches!(stream.into_descriptor(), Err(CoreError::VideoInfoError(_))));
    }

    #[test]
    fn test_no_frame_count_and_no_duration_rejected() {
        let stream = RawVideoStream {
            nb_frames: None,
            duration: None,
            ..raw()
        };
        assert!(matches!(stream.into_descriptor(), Err(CoreError::FfprobeParse(_))));
    }
}
