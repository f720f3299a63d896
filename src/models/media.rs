//! Technical metadata extracted from media files by ffprobe.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Normalized technical metadata for one media file.
///
/// Numeric fields that could not be parsed stay at zero and leave a message in
/// `warnings`; the rest of the record is still filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Path that was probed.
    pub filename: String,
    /// Short format name (e.g., "matroska,webm").
    pub format_name: String,
    /// Human readable format name.
    pub format_long_name: String,
    /// Total duration.
    pub duration: Duration,
    /// File size in bytes as reported by the probe.
    pub size: u64,
    /// Overall bit rate in bits per second.
    pub bit_rate: u64,
    /// Probe confidence (0-100).
    pub probe_score: i64,
    /// Container, taken from the format name.
    pub container: String,
    /// Codec of the first video stream.
    pub codec: String,
    /// Width of the first video stream.
    pub resolution_width: u32,
    /// Height of the first video stream.
    pub resolution_height: u32,
    /// Average frame rate of the first video stream (e.g., "24000/1001").
    pub frame_rate: String,
    /// All video streams, in stream order.
    pub video_tracks: Vec<VideoTrack>,
    /// All audio streams, in stream order.
    pub audio_tracks: Vec<AudioTrack>,
    /// All subtitle streams, in stream order.
    pub subtitle_tracks: Vec<SubtitleTrack>,
    /// Container level tags.
    pub tags: BTreeMap<String, String>,
    /// Per-field parse warnings collected while decoding.
    pub warnings: Vec<String>,
}

impl MediaMetadata {
    /// Channel count of the first audio track, or 0 without audio.
    pub fn primary_audio_channels(&self) -> u32 {
        self.audio_tracks.first().map(|t| t.channels).unwrap_or(0)
    }

    /// Whether any video track carries a Dolby Vision configuration record.
    pub fn has_dolby_vision(&self) -> bool {
        self.video_tracks
            .iter()
            .any(|t| t.side_data.iter().any(|s| s.dv_profile.is_some()))
    }
}

/// A single video stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    pub index: u32,
    pub codec_name: String,
    pub codec_long_name: String,
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub frame_rate: String,
    pub sample_aspect_ratio: String,
    pub display_aspect_ratio: String,
    pub pix_fmt: String,
    pub level: i64,
    pub color_range: String,
    pub color_space: String,
    pub color_transfer: String,
    pub color_primaries: String,
    pub field_order: String,
    pub tags: BTreeMap<String, String>,
    pub disposition: BTreeMap<String, i64>,
    pub side_data: Vec<SideData>,
}

/// Stream side data. Only the Dolby Vision fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideData {
    #[serde(default)]
    pub side_data_type: String,
    #[serde(default)]
    pub dv_version_major: Option<i64>,
    #[serde(default)]
    pub dv_version_minor: Option<i64>,
    #[serde(default)]
    pub dv_profile: Option<i64>,
    #[serde(default)]
    pub dv_level: Option<i64>,
    #[serde(default)]
    pub dv_bl_signal_compatibility_id: Option<i64>,
}

/// A single audio stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub index: u32,
    pub codec: String,
    pub channels: u32,
    pub channel_layout: String,
    pub sample_rate: u32,
    pub bit_rate: u64,
    /// From the `language` tag, empty when absent.
    pub language: String,
    pub tags: BTreeMap<String, String>,
    pub disposition: BTreeMap<String, i64>,
}

/// A single subtitle stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub index: u32,
    pub codec_name: String,
    pub codec_long_name: String,
    pub language: String,
    pub tags: BTreeMap<String, String>,
    pub disposition: BTreeMap<String, i64>,
}
