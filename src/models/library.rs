//! Library entities: libraries, movies and the series → season → episode tree.
//!
//! Relations are stored as ids assigned by the store. An episode points at its
//! season and (redundantly) its series; nothing points back.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::media::MediaMetadata;

/// Store-assigned entity id. Zero means "not stored yet".
pub type EntityId = u64;

/// Kind of media a library holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Movie,
    Series,
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryKind::Movie => write!(f, "movie"),
            LibraryKind::Series => write!(f, "series"),
        }
    }
}

/// An operator-configured media collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub id: EntityId,
    pub name: String,
    pub kind: LibraryKind,
    #[serde(default)]
    pub description: String,
    pub paths: Vec<LibraryPath>,
    pub auto_scan: bool,
    /// Duration string, e.g. "12h".
    pub scan_interval: String,
    pub last_scanned: Option<DateTime<Utc>>,
}

impl Library {
    pub fn new(name: impl Into<String>, kind: LibraryKind) -> Self {
        Self {
            id: 0,
            name: name.into(),
            kind,
            description: String::new(),
            paths: Vec::new(),
            auto_scan: true,
            scan_interval: "12h".to_string(),
            last_scanned: None,
        }
    }

    /// Add an enabled root.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(LibraryPath {
            path: path.into(),
            enabled: true,
        });
        self
    }

    /// Roots that should be walked.
    pub fn enabled_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter().filter(|p| p.enabled).map(|p| &p.path)
    }
}

/// A scan root of a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryPath {
    pub path: PathBuf,
    pub enabled: bool,
}

/// File identity and technical fields shared by movies and episodes.
///
/// `file_path` is the idempotency key: one item per path within a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub library_id: EntityId,
    pub file_path: PathBuf,
    pub container: String,
    pub codec: String,
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub audio_channels: u32,
    pub date_added: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
    /// Set when cleanup found the file missing.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LibraryItem {
    /// A fresh item stamped with `now` and whatever technical metadata is known.
    pub fn new(
        library_id: EntityId,
        file_path: PathBuf,
        metadata: Option<&MediaMetadata>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut item = Self {
            library_id,
            file_path,
            container: String::new(),
            codec: String::new(),
            resolution_width: 0,
            resolution_height: 0,
            audio_channels: 0,
            date_added: now,
            last_scanned: now,
            deleted_at: None,
        };
        if let Some(meta) = metadata {
            item.container = meta.container.clone();
            item.codec = meta.codec.clone();
            item.resolution_width = meta.resolution_width;
            item.resolution_height = meta.resolution_height;
            item.audio_channels = meta.primary_audio_channels();
        }
        item
    }

    /// Mark the item as seen by a scan. A reappearing file is undeleted.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_scanned = now;
        self.deleted_at = None;
    }
}

/// A movie file matched (or not) against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: EntityId,
    pub item: LibraryItem,
    pub title: String,
    pub original_title: String,
    pub tmdb_id: Option<u64>,
    pub overview: String,
    pub release_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: f64,
    pub vote_count: u32,
}

/// A TV series. Owns seasons through `Season::series_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: EntityId,
    pub library_id: EntityId,
    pub title: String,
    pub original_title: String,
    pub tmdb_id: Option<u64>,
    pub overview: String,
    pub first_air_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: f64,
    pub vote_count: u32,
    pub date_added: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
}

/// A season of a series. `season_number` is unique within the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: EntityId,
    pub series_id: EntityId,
    pub library_id: EntityId,
    pub season_number: u32,
    pub date_added: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
}

/// An episode file. `episode_number` is unique within the season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EntityId,
    pub item: LibraryItem,
    pub series_id: EntityId,
    pub season_id: EntityId,
    pub episode_number: u32,
    pub title: String,
}

/// Title used when the catalog has no per-episode data.
pub fn placeholder_episode_title(episode_number: u32) -> String {
    format!("Episode {}", episode_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_item_takes_first_audio_track() {
        let meta = MediaMetadata {
            container: "matroska,webm".to_string(),
            codec: "hevc".to_string(),
            resolution_width: 3840,
            resolution_height: 2160,
            audio_tracks: vec![
                crate::models::media::AudioTrack {
                    channels: 6,
                    ..Default::default()
                },
                crate::models::media::AudioTrack {
                    channels: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let item = LibraryItem::new(1, PathBuf::from("/m/a.mkv"), Some(&meta), Utc::now());
        assert_eq!(item.codec, "hevc");
        assert_eq!(item.resolution_width, 3840);
        assert_eq!(item.audio_channels, 6);
    }

    #[test]
    fn test_touch_clears_deleted_at() {
        let now = Utc::now();
        let mut item = LibraryItem::new(1, PathBuf::from("/m/a.mkv"), None, now);
        item.deleted_at = Some(now);
        item.touch(now);
        assert!(item.deleted_at.is_none());
    }

    #[test]
    fn test_placeholder_title() {
        assert_eq!(placeholder_episode_title(7), "Episode 7");
    }
}
