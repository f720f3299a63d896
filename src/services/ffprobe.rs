//! FFprobe service for extracting technical metadata.
//!
//! The probe report is decoded through a typed schema whose numeric fields
//! are read leniently: ffprobe reports most numbers as strings, and a value
//! that does not parse leaves its field at zero with a warning instead of
//! failing the whole extraction.

use crate::models::media::{AudioTrack, MediaMetadata, SideData, SubtitleTrack, VideoTrack};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Metadata extracted from a file, plus a soft error when ffprobe exited
/// non-zero but its output could still be decoded.
#[derive(Debug)]
pub struct ProbeReport {
    pub metadata: MediaMetadata,
    pub soft_error: Option<Error>,
}

/// Extracts technical metadata from media files.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ProbeReport>;
}

/// FFprobe output format.
#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// FFprobe format information.
#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: String,
    #[serde(default)]
    format_long_name: String,
    duration: Option<Value>,
    size: Option<Value>,
    bit_rate: Option<Value>,
    probe_score: Option<Value>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

/// FFprobe stream information.
#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    index: Option<Value>,
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    codec_long_name: String,
    #[serde(default)]
    profile: Value,

    // Video
    width: Option<Value>,
    height: Option<Value>,
    coded_width: Option<Value>,
    coded_height: Option<Value>,
    #[serde(default)]
    avg_frame_rate: String,
    #[serde(default)]
    sample_aspect_ratio: String,
    #[serde(default)]
    display_aspect_ratio: String,
    #[serde(default)]
    pix_fmt: String,
    level: Option<Value>,
    #[serde(default)]
    color_range: String,
    #[serde(default)]
    color_space: String,
    #[serde(default)]
    color_transfer: String,
    #[serde(default)]
    color_primaries: String,
    #[serde(default)]
    field_order: String,
    #[serde(default)]
    side_data_list: Vec<Value>,

    // Audio
    channels: Option<Value>,
    #[serde(default)]
    channel_layout: String,
    sample_rate: Option<Value>,
    bit_rate: Option<Value>,

    #[serde(default)]
    disposition: BTreeMap<String, Value>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

/// Collects per-field warnings while converting the raw report.
struct FieldReader {
    warnings: Vec<String>,
}

impl FieldReader {
    /// Read a number that may be encoded as a JSON number or a string.
    /// Missing values are silently absent; malformed ones warn.
    fn number<T: FromStr>(&mut self, field: &str, value: Option<&Value>) -> Option<T> {
        let text = match value? {
            Value::Null => return None,
            Value::Number(n) => n.to_string(),
            Value::String(s) if s.trim().is_empty() || s == "N/A" => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        match text.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Failed to parse {}: {:?}", field, text);
                self.warnings
                    .push(format!("could not parse {} from {:?}", field, text));
                None
            }
        }
    }

    fn duration(&mut self, field: &str, value: Option<&Value>) -> Duration {
        let Some(secs) = self.number::<f64>(field, value) else {
            return Duration::ZERO;
        };
        match Duration::try_from_secs_f64(secs) {
            Ok(d) => d,
            Err(_) => {
                tracing::warn!("Invalid {}: {}", field, secs);
                self.warnings.push(format!("invalid {} {}", field, secs));
                Duration::ZERO
            }
        }
    }

    fn side_data(&mut self, raw: &[Value]) -> Vec<SideData> {
        raw.iter()
            .filter_map(|v| match serde_json::from_value::<SideData>(v.clone()) {
                Ok(sd) => Some(sd),
                Err(e) => {
                    self.warnings.push(format!("skipped side data entry: {}", e));
                    None
                }
            })
            .collect()
    }
}

fn string_tags(raw: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    raw.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn int_map(raw: &BTreeMap<String, Value>) -> BTreeMap<String, i64> {
    raw.iter()
        .filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n)))
        .collect()
}

fn profile_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode ffprobe JSON output (`-show_format -show_streams`).
///
/// Only malformed JSON is an error. Unparseable numeric fields are recorded
/// in `MediaMetadata::warnings` and left at zero.
pub fn parse_probe_output(output: &[u8]) -> Result<MediaMetadata> {
    let ffprobe: FfprobeOutput = serde_json::from_slice(output)?;
    let mut reader = FieldReader {
        warnings: Vec::new(),
    };

    let format = &ffprobe.format;
    let mut metadata = MediaMetadata {
        format_name: format.format_name.clone(),
        format_long_name: format.format_long_name.clone(),
        container: format.format_name.clone(),
        tags: string_tags(&format.tags),
        ..Default::default()
    };
    metadata.duration = reader.duration("duration", format.duration.as_ref());
    metadata.size = reader.number("size", format.size.as_ref()).unwrap_or(0);
    metadata.bit_rate = reader.number("bit_rate", format.bit_rate.as_ref()).unwrap_or(0);
    metadata.probe_score = reader
        .number("probe_score", format.probe_score.as_ref())
        .unwrap_or(0);

    for stream in &ffprobe.streams {
        let index: u32 = reader.number("stream index", stream.index.as_ref()).unwrap_or(0);

        match stream.codec_type.as_str() {
            "video" => {
                let track = VideoTrack {
                    index,
                    codec_name: stream.codec_name.clone(),
                    codec_long_name: stream.codec_long_name.clone(),
                    profile: profile_string(&stream.profile),
                    width: reader.number("width", stream.width.as_ref()).unwrap_or(0),
                    height: reader.number("height", stream.height.as_ref()).unwrap_or(0),
                    coded_width: reader
                        .number("coded_width", stream.coded_width.as_ref())
                        .unwrap_or(0),
                    coded_height: reader
                        .number("coded_height", stream.coded_height.as_ref())
                        .unwrap_or(0),
                    frame_rate: stream.avg_frame_rate.clone(),
                    sample_aspect_ratio: stream.sample_aspect_ratio.clone(),
                    display_aspect_ratio: stream.display_aspect_ratio.clone(),
                    pix_fmt: stream.pix_fmt.clone(),
                    level: reader.number("level", stream.level.as_ref()).unwrap_or(0),
                    color_range: stream.color_range.clone(),
                    color_space: stream.color_space.clone(),
                    color_transfer: stream.color_transfer.clone(),
                    color_primaries: stream.color_primaries.clone(),
                    field_order: stream.field_order.clone(),
                    tags: string_tags(&stream.tags),
                    disposition: int_map(&stream.disposition),
                    side_data: reader.side_data(&stream.side_data_list),
                };

                // The first video stream is the main picture
                if metadata.video_tracks.is_empty() {
                    metadata.codec = track.codec_name.clone();
                    metadata.resolution_width = track.width;
                    metadata.resolution_height = track.height;
                    metadata.frame_rate = track.frame_rate.clone();
                }
                metadata.video_tracks.push(track);
            }
            "audio" => {
                let tags = string_tags(&stream.tags);
                metadata.audio_tracks.push(AudioTrack {
                    index,
                    codec: stream.codec_name.clone(),
                    channels: reader.number("channels", stream.channels.as_ref()).unwrap_or(0),
                    channel_layout: stream.channel_layout.clone(),
                    sample_rate: reader
                        .number("sample_rate", stream.sample_rate.as_ref())
                        .unwrap_or(0),
                    bit_rate: reader
                        .number("audio bit_rate", stream.bit_rate.as_ref())
                        .unwrap_or(0),
                    language: tags.get("language").cloned().unwrap_or_default(),
                    tags,
                    disposition: int_map(&stream.disposition),
                });
            }
            "subtitle" => {
                let tags = string_tags(&stream.tags);
                metadata.subtitle_tracks.push(SubtitleTrack {
                    index,
                    codec_name: stream.codec_name.clone(),
                    codec_long_name: stream.codec_long_name.clone(),
                    language: tags.get("language").cloned().unwrap_or_default(),
                    tags,
                    disposition: int_map(&stream.disposition),
                });
            }
            other => {
                tracing::debug!("Skipping unsupported stream type: {:?}", other);
            }
        }
    }

    metadata.warnings = reader.warnings;
    Ok(metadata)
}

/// Runs the ffprobe binary.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    path: PathBuf,
}

impl Ffprobe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Check if ffprobe is installed.
    pub async fn is_installed(&self) -> bool {
        Command::new(&self.path)
            .arg("-version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Get ffprobe version.
    pub async fn get_version(&self) -> Result<String> {
        let output = Command::new(&self.path).arg("-version").output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("unknown");

        Ok(first_line.to_string())
    }

    /// Extract metadata from a file.
    ///
    /// The child process is killed if the returned future is dropped, so
    /// racing this against a cancellation token stops the probe.
    pub async fn probe(&self, path: &Path) -> Result<ProbeReport> {
        tracing::debug!("Probing {}", path.display());
        let start = Instant::now();

        let output = Command::new(&self.path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::FfprobeNotFound(self.path.display().to_string())
                }
                _ => Error::Probe {
                    path: path.display().to_string(),
                    message: e.to_string(),
                },
            })?;

        // A non-zero exit is tolerated as long as stdout still decodes
        let soft_error = if output.status.success() {
            None
        } else {
            Some(Error::ProbeExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        };

        let mut metadata = match parse_probe_output(&output.stdout) {
            Ok(m) => m,
            Err(e) => {
                let cause = soft_error.unwrap_or(e);
                return Err(Error::Probe {
                    path: path.display().to_string(),
                    message: cause.to_string(),
                });
            }
        };
        metadata.filename = path.display().to_string();

        tracing::debug!(
            "Probed {} in {:.2}s",
            path.display(),
            start.elapsed().as_secs_f32()
        );

        Ok(ProbeReport {
            metadata,
            soft_error,
        })
    }
}

#[async_trait]
impl MediaExtractor for Ffprobe {
    async fn extract(&self, path: &Path) -> Result<ProbeReport> {
        self.probe(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_accepts_strings_and_numbers() {
        let mut reader = FieldReader {
            warnings: Vec::new(),
        };
        assert_eq!(reader.number::<u64>("size", Some(&Value::from("1024"))), Some(1024));
        assert_eq!(reader.number::<u32>("width", Some(&Value::from(1920))), Some(1920));
        assert_eq!(reader.number::<u32>("width", None), None);
        assert_eq!(reader.number::<u64>("bit_rate", Some(&Value::from("N/A"))), None);
        assert!(reader.warnings.is_empty());

        assert_eq!(reader.number::<u64>("size", Some(&Value::from("big"))), None);
        assert_eq!(reader.warnings.len(), 1);
    }

    #[test]
    fn test_negative_duration_is_zero() {
        let mut reader = FieldReader {
            warnings: Vec::new(),
        };
        let d = reader.duration("duration", Some(&Value::from("-3.5")));
        assert_eq!(d, Duration::ZERO);
        assert_eq!(reader.warnings.len(), 1);
    }

    #[test]
    fn test_profile_string() {
        assert_eq!(profile_string(&Value::from("Main 10")), "Main 10");
        assert_eq!(profile_string(&Value::from(4)), "4");
        assert_eq!(profile_string(&Value::Null), "");
    }
}
