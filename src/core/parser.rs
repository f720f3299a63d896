//! Filename heuristics.
//!
//! Pure functions that turn a file path into:
//! - A file classification (video or ignored)
//! - A movie identity (title, year)
//! - A series episode identity (title, season, episode)

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported video container extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    // Common formats
    "mkv", "mp4", "avi", "mov", "wmv", // Additional formats
    "m4v", "ts", "m2ts", "flv", "webm", // Less common but supported
    "mpg", "mpeg", "vob", "ogv", "divx", "3gp", "mts", "asf",
];

/// Directory names holding bonus material rather than main features.
const EXTRAS_DIRECTORIES: &[&str] = &[
    "extras",
    "extra",
    "featurettes",
    "featurette",
    "behind the scenes",
    "behindthescenes",
    "deleted scenes",
    "deletedscenes",
    "making of",
    "makingof",
    "bonus",
    "bonuses",
    "special features",
    "specialfeatures",
    "sample",
    "samples",
];

/// Classification of a file found while walking a library root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A video container worth reconciling.
    Video,
    /// Anything else: other extensions, samples, extras.
    Ignored,
}

/// Title and optional year parsed from a movie filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieInfo {
    pub title: String,
    pub year: Option<u16>,
}

/// Series title, season and episode parsed from an episode filename.
///
/// Season and episode are zero when no pattern matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

impl EpisodeInfo {
    /// Whether both season and episode were recognised.
    pub fn is_parsed(&self) -> bool {
        self.season != 0 && self.episode != 0
    }
}

/// Check if a file extension is a video format.
fn is_video_extension(ext: &str) -> bool {
    let ext_lower = ext.to_lowercase();
    VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
}

/// Check if a file is inside an extras or sample directory.
///
/// Matches exact names (case-insensitive) and release-style suffixes such as
/// "The.Bourne.Identity.Extras-Grym".
fn is_in_extras_directory(path: &Path) -> bool {
    let parent = match path.parent() {
        Some(p) => p,
        None => return false,
    };

    parent.components().any(|component| {
        let std::path::Component::Normal(name) = component else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();

        EXTRAS_DIRECTORIES.contains(&name.as_str())
            || [".extras", "-extras", "_extras", ".featurette", "-featurette", ".sample", "-sample"]
                .iter()
                .any(|suffix| name.contains(suffix))
    })
}

/// Check if a filename indicates a sample file.
fn is_sample_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.contains("sample") && !lower.contains("sampler")
}

/// Classify a file by extension (case-insensitive) and location.
pub fn classify_file(path: &Path) -> FileKind {
    let is_video = path
        .extension()
        .map(|ext| is_video_extension(&ext.to_string_lossy()))
        .unwrap_or(false);
    if !is_video {
        return FileKind::Ignored;
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if is_sample_filename(&filename) || is_in_extras_directory(path) {
        return FileKind::Ignored;
    }

    FileKind::Video
}

/// Cheap pre-filter: does the filename carry a season/episode marker?
pub fn looks_like_series_episode(path: &Path) -> bool {
    let filename = file_stem(path);
    let patterns = [
        r"(?i)(?:^|[^a-z0-9])s\d{1,2}[\. _-]?e\d{1,3}",
        r"(?i)(?:^|[\. _-])\d{1,2}x\d{2,3}(?:$|[\. _-])",
    ];

    patterns.iter().any(|pattern| {
        regex::Regex::new(pattern)
            .map(|re| re.is_match(&filename))
            .unwrap_or(false)
    })
}

/// Parse a movie filename into title and year.
///
/// Year patterns are tried in order: "(2010)", "[2010]", ".2010." (or a
/// trailing ".2010"). The first pattern producing a non-empty title wins;
/// the title is everything before the year token. Without a year the whole
/// stem becomes the title.
pub fn parse_movie(path: &Path) -> MovieInfo {
    let stem = file_stem(path);
    let patterns = [
        r"^(.*?)\s*\((\d{4})\)",
        r"^(.*?)\s*\[(\d{4})\]",
        r"^(.*?)\.(\d{4})(?:\.|$)",
    ];

    for pattern in patterns {
        let Ok(re) = regex::Regex::new(pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(&stem) {
            let title = clean_title(&caps[1]);
            if title.is_empty() {
                continue;
            }
            return MovieInfo {
                title,
                year: caps[2].parse().ok(),
            };
        }
    }

    MovieInfo {
        title: clean_title(&stem),
        year: None,
    }
}

/// Parse a series episode filename.
///
/// Patterns, first match wins (case-insensitive, separators among space, dot,
/// underscore and hyphen):
/// - `Show Name S01E02`
/// - `Show.Name.1x02`
/// - `Show_Name_102` (one season digit, two episode digits)
///
/// Without a match season and episode are zero; callers must skip the file.
pub fn parse_series_episode(path: &Path) -> EpisodeInfo {
    let stem = file_stem(path);
    let patterns = [
        r"(?i)^(.+?)[\. _-]+S(\d{1,2})[\. _-]?E(\d{1,3})",
        r"(?i)^(.+?)[\. _-]+(\d{1,2})x(\d{1,3})",
        r"(?i)^(.+?)[\. _-]+(\d)(\d{2})(?:[\. _-]|$)",
    ];

    for pattern in patterns {
        let Ok(re) = regex::Regex::new(pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(&stem) {
            return EpisodeInfo {
                title: clean_title(&caps[1]),
                season: caps[2].parse().unwrap_or(0),
                episode: caps[3].parse().unwrap_or(0),
            };
        }
    }

    EpisodeInfo {
        title: clean_title(&stem),
        season: 0,
        episode: 0,
    }
}

/// Replace dots and underscores with spaces and collapse whitespace.
pub fn clean_title(title: &str) -> String {
    let replaced = title.replace(['.', '_'], " ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_extension() {
        assert!(is_video_extension("mkv"));
        assert!(is_video_extension("MKV"));
        assert!(is_video_extension("mp4"));
        assert!(!is_video_extension("txt"));
        assert!(!is_video_extension("srt"));
        assert!(!is_video_extension("nfo"));
    }

    #[test]
    fn test_is_sample_filename() {
        assert!(is_sample_filename("sample.mkv"));
        assert!(is_sample_filename("movie-sample.mkv"));
        assert!(!is_sample_filename("movie.mkv"));
        assert!(!is_sample_filename("sampler.mkv"));
    }

    #[test]
    fn test_is_in_extras_directory() {
        assert!(is_in_extras_directory(Path::new("/movies/Heat (1995)/Extras/trailer.mkv")));
        assert!(is_in_extras_directory(Path::new("/movies/The.Bourne.Identity.Extras-Grym/x.mkv")));
        assert!(!is_in_extras_directory(Path::new("/movies/Heat (1995)/Heat (1995).mkv")));
        // Only directories count, not the file itself
        assert!(!is_in_extras_directory(Path::new("/movies/Bonus.mkv")));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Show.Name"), "Show Name");
        assert_eq!(clean_title("Show_Name__Two"), "Show Name Two");
        assert_eq!(clean_title("  Movie  - "), "Movie");
    }
}
