//! MediaInfo integration for track inspection and bitrate read-back.
//!
//! Runs `mediainfo --Output=JSON` and deserializes the response with serde.
//! Parsing is kept in pure functions so it can be tested on captured JSON.

use crate::error::{CoreError, CoreResult, command_failed_error, command_start_error};
use crate::media::{Track, TrackKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// One entry of the mediainfo `track` array.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MediaInfoTrack {
    #[serde(rename = "@type")]
    pub track_type: String,
    #[serde(rename = "StreamOrder")]
    pub stream_order: Option<String>,
    #[serde(rename = "Language")]
    pub language: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Format")]
    pub format: Option<String>,
    #[serde(rename = "BitRate")]
    pub bit_rate: Option<String>,
}

/// MediaInfo media container
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaInfoMedia {
    pub track: Vec<MediaInfoTrack>,
}

/// Root MediaInfo response structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaInfoResponse {
    pub media: MediaInfoMedia,
}

/// Track inspection and bitrate read-back.
pub trait MediaInfoExecutor {
    /// Lists every track of the container in mediainfo order.
    fn get_tracks(&self, input_path: &Path) -> CoreResult<Vec<Track>>;

    /// Bitrate of the first video track in kbps.
    fn get_video_bitrate_kbps(&self, input_path: &Path) -> CoreResult<u64>;
}

/// `MediaInfoExecutor` that shells out to the `mediainfo` binary.
#[derive(Debug, Clone, Default)]
pub struct CommandMediaInfoExecutor;

impl MediaInfoExecutor for CommandMediaInfoExecutor {
    fn get_tracks(&self, input_path: &Path) -> CoreResult<Vec<Track>> {
        let response = get_media_info(input_path)?;
        tracks_from_response(&response)
    }

    fn get_video_bitrate_kbps(&self, input_path: &Path) -> CoreResult<u64> {
        let response = get_media_info(input_path)?;
        video_bitrate_kbps(&response).ok_or_else(|| {
            CoreError::VideoInfoError(format!(
                "mediainfo reported no video bitrate for {}",
                input_path.display()
            ))
        })
    }
}

/// Runs mediainfo and parses its JSON output.
pub fn get_media_info(input_path: &Path) -> CoreResult<MediaInfoResponse> {
    log::debug!("Running: mediainfo --Output=JSON {}", input_path.display());

    let output = Command::new("mediainfo")
        .arg("--Output=JSON")
        .arg(input_path)
        .output()
        .map_err(|e| command_start_error("mediainfo", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(command_failed_error("mediainfo", output.status, stderr));
    }

    parse_media_info(&String::from_utf8_lossy(&output.stdout)).map_err(|e| {
        CoreError::JsonParseError(format!(
            "Failed to parse mediainfo JSON output for {}: {}",
            input_path.display(),
            e
        ))
    })
}

/// Deserializes a mediainfo JSON document.
pub fn parse_media_info(json: &str) -> Result<MediaInfoResponse, serde_json::Error> {
    serde_json::from_str(json)
}

/// Converts the raw response into `Track` values.
///
/// Entries mkvextract never addresses (General, Menu, ...) default to order 0.
/// Audio and Text entries must carry a plain integer `StreamOrder`, since it
/// becomes the mkvextract track id.
///
/// # Errors
///
/// * `CoreError::JsonParseError` - an Audio or Text track's `StreamOrder` is missing or not an integer
pub fn tracks_from_response(response: &MediaInfoResponse) -> CoreResult<Vec<Track>> {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    response
        .media
        .track
        .iter()
        .enumerate()
        .map(|(index, t)| {
            let kind = TrackKind::from_mediainfo(&t.track_type);
            let parsed = t
                .stream_order
                .as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok());

            let stream_order = match (&kind, parsed) {
                (_, Some(order)) => order,
                (TrackKind::Audio | TrackKind::Text, None) => {
                    return Err(CoreError::JsonParseError(format!(
                        "mediainfo {} track #{index} has an unusable StreamOrder {:?}",
                        t.track_type, t.stream_order
                    )));
                }
                (_, None) => 0,
            };

            Ok(Track {
                kind,
                stream_order,
                language: non_empty(&t.language),
                title: non_empty(&t.title),
                format: non_empty(&t.format),
            })
        })
        .collect()
}

/// Bitrate of the first video track, bits/s reduced to kbps.
pub fn video_bitrate_kbps(response: &MediaInfoResponse) -> Option<u64> {
    response
        .media
        .track
        .iter()
        .find(|t| t.track_type == "Video")
        .and_then(|t| t.bit_rate.as_deref())
        .and_then(|b| b.trim().parse::<f64>().ok())
        .map(|bps| (bps / 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "creatingLibrary": {"name": "MediaInfoLib", "version": "23.04"},
        "media": {
            "@ref": "movie.mkv",
            "track": [
                {"@type": "General", "Format": "Matroska"},
                {"@type": "Video", "StreamOrder": "0", "Format": "AVC", "BitRate": "4012345"},
                {"@type": "Audio", "StreamOrder": "1", "Format": "AC-3", "Language": "en", "Title": "Main"},
                {"@type": "Audio", "StreamOrder": "2", "Format": "DTS", "Language": "ja"},
                {"@type": "Text", "StreamOrder": "3", "Format": "UTF-8", "Title": ""},
                {"@type": "Menu"}
            ]
        }
    }"#;

    #[test]
    fn test_tracks_from_response() {
        let response = parse_media_info(SAMPLE).unwrap();
        let tracks = tracks_from_response(&response).unwrap();

        assert_eq!(tracks.len(), 6);
        assert_eq!(tracks[2].kind, TrackKind::Audio);
        assert_eq!(tracks[2].stream_order, 1);
        assert_eq!(tracks[2].language.as_deref(), Some("en"));
        assert_eq!(tracks[2].title.as_deref(), Some("Main"));
        assert_eq!(tracks[3].title, None);
        // Empty titles are treated as absent
        assert_eq!(tracks[4].title, None);
        assert_eq!(tracks[5].kind, TrackKind::Menu);
    }

    #[test]
    fn test_audio_track_with_compound_stream_order_rejected() {
        let response = parse_media_info(
            r#"{"media": {"track": [
                {"@type": "Video", "StreamOrder": "0"},
                {"@type": "Audio", "StreamOrder": "0-1", "Format": "AC-3"}
            ]}}"#,
        )
        .unwrap();

        match tracks_from_response(&response) {
            Err(CoreError::JsonParseError(msg)) => {
                assert!(msg.contains("Audio track #1"), "{msg}");
                assert!(msg.contains("0-1"), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_text_track_without_stream_order_rejected() {
        let response =
            parse_media_info(r#"{"media": {"track": [{"@type": "Text", "Format": "PGS"}]}}"#)
                .unwrap();
        assert!(matches!(
            tracks_from_response(&response),
            Err(CoreError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_container_entries_default_to_order_zero() {
        let response = parse_media_info(
            r#"{"media": {"track": [{"@type": "General"}, {"@type": "Menu"}]}}"#,
        )
        .unwrap();
        let tracks = tracks_from_response(&response).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.stream_order == 0));
    }

    #[test]
    fn test_video_bitrate_kbps() {
        let response = parse_media_info(SAMPLE).unwrap();
        assert_eq!(video_bitrate_kbps(&response), Some(4012));
    }

    #[test]
    fn test_video_bitrate_missing() {
        let response =
            parse_media_info(r#"{"media": {"track": [{"@type": "Video"}]}}"#).unwrap();
        assert_eq!(video_bitrate_kbps(&response), None);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(parse_media_info("not json").is_err());
    }
}
