//! Container track metadata as reported by mediainfo.

use std::fmt;

/// Kind of an elementary stream (mediainfo `@type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackKind {
    General,
    Video,
    Audio,
    Text,
    Menu,
    Other(String),
}

impl TrackKind {
    pub fn from_mediainfo(kind: &str) -> Self {
        match kind {
            "General" => TrackKind::General,
            "Video" => TrackKind::Video,
            "Audio" => TrackKind::Audio,
            "Text" => TrackKind::Text,
            "Menu" => TrackKind::Menu,
            other => TrackKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::General => f.write_str("General"),
            TrackKind::Video => f.write_str("Video"),
            TrackKind::Audio => f.write_str("Audio"),
            TrackKind::Text => f.write_str("Text"),
            TrackKind::Menu => f.write_str("Menu"),
            TrackKind::Other(kind) => f.write_str(kind),
        }
    }
}

/// One track of the source container. Never mutated, only filtered and
/// projected into command arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    /// Zero-based stream index inside the container (mkvextract track id)
    pub stream_order: u32,
    pub language: Option<String>,
    pub title: Option<String>,
    /// mediainfo `Format` (e.g. "AC-3", "UTF-8", "PGS")
    pub format: Option<String>,
}

impl Track {
    /// File extension for the raw stream mkvextract writes for this track.
    #[must_use]
    pub fn extract_extension(&self) -> &'static str {
        let format = self.format.as_deref().unwrap_or("");
        match self.kind {
            TrackKind::Audio => match format {
                "AC-3" => "ac3",
                "E-AC-3" => "eac3",
                "DTS" => "dts",
                "AAC" => "aac",
                "FLAC" => "flac",
                "Opus" => "opus",
                "Vorbis" => "ogg",
                "MPEG Audio" => "mp3",
                "MLP FBA" | "TrueHD" => "thd",
                "PCM" => "wav",
                _ => "mka",
            },
            TrackKind::Text => match format {
                "UTF-8" | "SubRip" => "srt",
                "ASS" | "SSA" => "ass",
                "PGS" => "sup",
                "VobSub" => "sub",
                "WebVTT" => "vtt",
                _ => "mks",
            },
            _ => "bin",
        }
    }
}

/// Audio and subtitle tracks of a source, in container order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSet {
    pub audio: Vec<Track>,
    pub subtitles: Vec<Track>,
}

impl TrackSet {
    /// Partitions inspected tracks into the audio and text subsets.
    pub fn partition(tracks: &[Track]) -> Self {
        let by_kind = |kind: TrackKind| -> Vec<Track> {
            tracks.iter().filter(|t| t.kind == kind).cloned().collect()
        };

        Self {
            audio: by_kind(TrackKind::Audio),
            subtitles: by_kind(TrackKind::Text),
        }
    }

    pub fn len(&self) -> usize {
        self.audio.len() + self.subtitles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(kind: TrackKind, order: u32, format: &str) -> Track {
        Track {
            kind,
            stream_order: order,
            language: None,
            title: None,
            format: Some(format.to_string()),
        }
    }

    #[test]
    fn test_partition_keeps_container_order() {
        let tracks = vec![
            track(TrackKind::General, 0, ""),
            track(TrackKind::Video, 0, "AVC"),
            track(TrackKind::Audio, 1, "AC-3"),
            track(TrackKind::Text, 3, "UTF-8"),
            track(TrackKind::Audio, 2, "DTS"),
            track(TrackKind::Menu, 0, ""),
        ];

        let set = TrackSet::partition(&tracks);
        assert_eq!(set.audio.iter().map(|t| t.stream_order).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(set.subtitles.len(), 1);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_extract_extension() {
        assert_eq!(track(TrackKind::Audio, 1, "E-AC-3").extract_extension(), "eac3");
        assert_eq!(track(TrackKind::Audio, 1, "Something").extract_extension(), "mka");
        assert_eq!(track(TrackKind::Text, 2, "PGS").extract_extension(), "sup");
        assert_eq!(track(TrackKind::Text, 2, "UTF-8").extract_extension(), "srt");
    }

    #[test]
    fn test_kind_from_mediainfo() {
        assert_eq!(TrackKind::from_mediainfo("Audio"), TrackKind::Audio);
        assert_eq!(TrackKind::from_mediainfo("Image"), TrackKind::Other("Image".to_string()));
    }
}
