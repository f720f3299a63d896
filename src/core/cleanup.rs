//! Cleanup of items whose files are gone.
//!
//! Missing files are soft-deleted by stamping `deleted_at`; a later scan of
//! the same path clears the stamp again. Items soft-deleted for longer than
//! `purge_after` are removed from the store. Series and seasons stay, even
//! when they end up without episodes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::scheduler::{parse_interval, parse_task_config, TaskExecutor};
use crate::models::config::CleanupConfig;
use crate::models::library::{Library, LibraryItem};
use crate::store::{Persist, Store};
use crate::{Error, Result, ResultExt};

/// Task type of the cleanup executor.
pub const TASK_TYPE: &str = "cleanup";

/// Effective settings of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    pub delete_missing: bool,
    pub purge_after: Option<Duration>,
}

impl CleanupOptions {
    /// Settings from configuration.
    pub fn from_config(config: &CleanupConfig) -> Result<Self> {
        Ok(Self {
            delete_missing: config.delete_missing,
            purge_after: config
                .purge_after
                .as_deref()
                .map(parse_interval)
                .transpose()?,
        })
    }
}

/// Counters of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Items checked.
    pub checked: usize,
    /// Items newly soft-deleted.
    pub marked_missing: usize,
    /// Items removed from the store.
    pub purged: usize,
}

/// What to do with one item.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Keep,
    MarkMissing,
    Purge,
}

fn decide(
    item: &LibraryItem,
    exists: bool,
    options: &CleanupOptions,
    now: DateTime<Utc>,
) -> Action {
    if let (Some(deleted_at), Some(purge_after)) = (item.deleted_at, options.purge_after) {
        let expired = chrono::Duration::from_std(purge_after)
            .ok()
            .and_then(|age| deleted_at.checked_add_signed(age))
            .map_or(false, |expiry| expiry <= now);
        if expired && !exists {
            return Action::Purge;
        }
    }
    if options.delete_missing && !exists && item.deleted_at.is_none() {
        return Action::MarkMissing;
    }
    Action::Keep
}

/// Whether a file is still there. Unreadable counts as present.
async fn file_exists(path: &Path) -> bool {
    match tokio::fs::try_exists(path).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!("Cannot check {}: {}", path.display(), e);
            true
        }
    }
}

/// Removes stale items from the store.
pub struct Cleanup {
    store: Arc<dyn Store>,
    config: CleanupConfig,
}

impl Cleanup {
    pub fn new(store: Arc<dyn Store>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// Clean every library. Changes made before a failure or cancellation
    /// are still flushed.
    pub async fn run(
        &self,
        options: &CleanupOptions,
        cancel: &CancellationToken,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let cleaned = self.clean_all(options, cancel, &mut report).await;
        let flushed = self.store.flush().await.context("save cleanup results");
        cleaned?;
        flushed?;
        Ok(report)
    }

    async fn clean_all(
        &self,
        options: &CleanupOptions,
        cancel: &CancellationToken,
        report: &mut CleanupReport,
    ) -> Result<()> {
        for library in self.store.list_libraries().await? {
            self.clean_library(&library, options, cancel, report)
                .await
                .with_context(|| format!("clean library '{}'", library.name))?;
        }
        Ok(())
    }

    async fn clean_library(
        &self,
        library: &Library,
        options: &CleanupOptions,
        cancel: &CancellationToken,
        report: &mut CleanupReport,
    ) -> Result<()> {
        let now = Utc::now();

        for mut movie in self.store.list_movies(library.id).await? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.checked += 1;
            let exists = file_exists(&movie.item.file_path).await;
            match decide(&movie.item, exists, options, now) {
                Action::Keep => {}
                Action::MarkMissing => {
                    tracing::info!("Movie file missing: {}", movie.item.file_path.display());
                    movie.item.deleted_at = Some(now);
                    self.store.update_movie(&movie).await?;
                    report.marked_missing += 1;
                }
                Action::Purge => {
                    tracing::info!("Removing movie '{}'", movie.title);
                    self.store.delete_movie(movie.id).await?;
                    report.purged += 1;
                }
            }
        }

        for mut episode in self.store.list_episodes(library.id).await? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.checked += 1;
            let exists = file_exists(&episode.item.file_path).await;
            match decide(&episode.item, exists, options, now) {
                Action::Keep => {}
                Action::MarkMissing => {
                    tracing::info!("Episode file missing: {}", episode.item.file_path.display());
                    episode.item.deleted_at = Some(now);
                    self.store.update_episode(&episode).await?;
                    report.marked_missing += 1;
                }
                Action::Purge => {
                    tracing::info!("Removing episode {}", episode.item.file_path.display());
                    self.store.delete_episode(episode.id).await?;
                    report.purged += 1;
                }
            }
        }

        Ok(())
    }
}

/// Per-task overrides of the cleanup configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CleanupTaskConfig {
    delete_missing: Option<bool>,
    purge_after: Option<String>,
}

#[async_trait]
impl TaskExecutor for Cleanup {
    async fn execute(&self, cancel: &CancellationToken, config: &str) -> Result<()> {
        let overrides: CleanupTaskConfig = parse_task_config(TASK_TYPE, config)?;

        let mut options = CleanupOptions::from_config(&self.config)?;
        if let Some(delete_missing) = overrides.delete_missing {
            options.delete_missing = delete_missing;
        }
        if let Some(purge_after) = overrides.purge_after.as_deref() {
            options.purge_after = Some(parse_interval(purge_after)?);
        }

        let report = self.run(&options, cancel).await?;
        tracing::info!(
            "Cleanup finished: {} items checked, {} marked missing, {} purged",
            report.checked,
            report.marked_missing,
            report.purged
        );
        Ok(())
    }

    fn description(&self) -> &str {
        "Mark missing files deleted and purge old deletions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(deleted_at: Option<DateTime<Utc>>) -> LibraryItem {
        let mut item = LibraryItem::new(1, PathBuf::from("/m/a.mkv"), None, Utc::now());
        item.deleted_at = deleted_at;
        item
    }

    #[test]
    fn test_missing_file_is_marked_once() {
        let now = Utc::now();
        let options = CleanupOptions {
            delete_missing: true,
            purge_after: None,
        };
        assert_eq!(decide(&item(None), false, &options, now), Action::MarkMissing);
        assert_eq!(decide(&item(Some(now)), false, &options, now), Action::Keep);
        assert_eq!(decide(&item(None), true, &options, now), Action::Keep);
    }

    #[test]
    fn test_purge_after_expiry() {
        let now = Utc::now();
        let options = CleanupOptions {
            delete_missing: true,
            purge_after: Some(Duration::from_secs(3_600)),
        };
        let old = now - chrono::Duration::hours(2);
        let recent = now - chrono::Duration::minutes(5);
        assert_eq!(decide(&item(Some(old)), false, &options, now), Action::Purge);
        assert_eq!(decide(&item(Some(recent)), false, &options, now), Action::Keep);
        // The file came back but no scan has run yet
        assert_eq!(decide(&item(Some(old)), true, &options, now), Action::Keep);
    }

    #[test]
    fn test_purge_after_past_calendar_end_keeps_item() {
        let now = Utc::now();
        let options = CleanupOptions {
            delete_missing: true,
            purge_after: Some(parse_interval("300000years").unwrap()),
        };
        let old = now - chrono::Duration::days(365);
        assert_eq!(decide(&item(Some(old)), false, &options, now), Action::Keep);
    }

    #[test]
    fn test_options_from_config() {
        let options = CleanupOptions::from_config(&CleanupConfig {
            purge_after: Some("30days".to_string()),
            ..CleanupConfig::default()
        })
        .unwrap();
        assert!(options.delete_missing);
        assert_eq!(options.purge_after, Some(Duration::from_secs(30 * 86_400)));

        let invalid = CleanupOptions::from_config(&CleanupConfig {
            purge_after: Some("later".to_string()),
            ..CleanupConfig::default()
        });
        assert!(invalid.is_err());
    }
}
