//! Configuration model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TMDB configuration.
    pub tmdb: TmdbConfig,
    /// ffprobe configuration.
    pub ffprobe: FfprobeConfig,
    /// Library scanner job.
    pub scanner: ScannerConfig,
    /// Cleanup job.
    pub cleanup: CleanupConfig,
    /// Directory holding the store snapshot.
    pub data_dir: PathBuf,
}

/// TMDB configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmdbConfig {
    /// API read access token (v4 bearer token).
    pub bearer_token: Option<String>,
    /// Language for responses.
    pub language: String,
    /// Include adult titles in search results.
    pub include_adult: bool,
    /// API base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// ffprobe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfprobeConfig {
    /// Binary name or path.
    pub path: PathBuf,
}

/// Scanner job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Roots of the movie library.
    pub movie_dirs: Vec<PathBuf>,
    /// Roots of the series library.
    pub series_dirs: Vec<PathBuf>,
    /// Run the scan periodically.
    pub auto_scan: bool,
    /// Filesystem watching. Not supported, only accepted.
    pub watch_dirs: bool,
    /// Interval between scans (e.g. "12h", "2days").
    pub scan_interval: String,
    /// Number of files reconciled concurrently.
    pub workers: usize,
}

/// Cleanup job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Run the cleanup periodically.
    pub enabled: bool,
    /// Soft-delete items whose file is gone.
    pub delete_missing: bool,
    /// Remove soft-deleted items after this long (e.g. "30days").
    pub purge_after: Option<String>,
    /// Interval between cleanups.
    pub clean_interval: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmdb: TmdbConfig::default(),
            ffprobe: FfprobeConfig::default(),
            scanner: ScannerConfig::default(),
            cleanup: CleanupConfig::default(),
            data_dir: dirs_config_path().join("data"),
        }
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            bearer_token: token_from_env(),
            language: "en-US".to_string(),
            include_adult: false,
            base_url: "https://api.themoviedb.org/3".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for FfprobeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            movie_dirs: Vec::new(),
            series_dirs: Vec::new(),
            auto_scan: true,
            watch_dirs: false,
            scan_interval: "12h".to_string(),
            workers: 4,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delete_missing: true,
            purge_after: None,
            clean_interval: "24h".to_string(),
        }
    }
}

fn token_from_env() -> Option<String> {
    std::env::var("TMDB_BEARER_TOKEN")
        .or_else(|_| std::env::var("TMDB_API_KEY"))
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// Get the configuration directory path.
fn dirs_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media_library")
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs_config_path().join("config.toml")
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, the default location is used
/// and a missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> crate::Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(crate::Error::PathNotFound(p.display().to_string()));
            }
            p.to_path_buf()
        }
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        parse_config(&content).map_err(|source| crate::Error::Config {
            path: config_path.display().to_string(),
            source,
        })?
    } else {
        tracing::debug!("No config at {}, using defaults", config_path.display());
        Config::default()
    };

    if config.tmdb.bearer_token.is_none() {
        config.tmdb.bearer_token = token_from_env();
    }
    config.expand_env();

    Ok(config)
}

/// Parse configuration from TOML text.
pub fn parse_config(content: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(content)
}

impl Config {
    /// Expand `$VAR` and `${VAR}` references in configured paths.
    fn expand_env(&mut self) {
        for dir in self
            .scanner
            .movie_dirs
            .iter_mut()
            .chain(self.scanner.series_dirs.iter_mut())
        {
            *dir = PathBuf::from(expand_env_vars(&dir.to_string_lossy()));
        }
        self.data_dir = PathBuf::from(expand_env_vars(&self.data_dir.to_string_lossy()));
    }

    /// Path of the store snapshot.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }
}

/// Replace environment references; unset variables expand to nothing.
pub fn expand_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
    else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_default()
    })
    .into_owned()
}
