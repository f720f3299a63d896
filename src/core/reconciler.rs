//! Entity reconciliation.
//!
//! Maps one scanned file onto the entity graph: a `Movie`, or a
//! `Series` → `Season` → `Episode` chain. The file path is the idempotency
//! key, so a path already in the store is only re-stamped and never matched
//! against the catalog again.
//!
//! Probe and catalog failures degrade the result (no technical fields, or a
//! filename-derived title) but never abort the file. Store failures do, and
//! leave any parent entities already written in place.

use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::parser::{self, EpisodeInfo};
use crate::models::library::{
    placeholder_episode_title, Episode, Library, LibraryItem, LibraryKind, Movie, Season, Series,
};
use crate::models::media::MediaMetadata;
use crate::services::ffprobe::MediaExtractor;
use crate::services::tmdb::{MetadataCatalog, MovieResult, SearchQuery, SeriesResult};
use crate::store::Store;
use crate::{Error, Result, ResultExt};

/// What happened to a reconciled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new movie or episode was stored.
    Created,
    /// The path was already known; only `last_scanned` changed.
    Refreshed,
    /// The file could not be identified and was left alone.
    Skipped,
}

/// Race a future against the cancellation token.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Finds or creates the entities for scanned files.
pub struct Reconciler {
    store: Arc<dyn Store>,
    extractor: Arc<dyn MediaExtractor>,
    catalog: Option<Arc<dyn MetadataCatalog>>,
    /// Serializes series/season find-or-create between concurrent workers.
    series_lock: Mutex<()>,
}

impl Reconciler {
    /// Create a reconciler. Without a catalog, titles come from filenames.
    pub fn new(
        store: Arc<dyn Store>,
        extractor: Arc<dyn MediaExtractor>,
        catalog: Option<Arc<dyn MetadataCatalog>>,
    ) -> Self {
        Self {
            store,
            extractor,
            catalog,
            series_lock: Mutex::new(()),
        }
    }

    /// Reconcile one video file of `library`.
    ///
    /// Files that look like episodes, and every file of a series library,
    /// take the episode path.
    pub async fn reconcile(
        &self,
        library: &Library,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if library.kind == LibraryKind::Series || parser::looks_like_series_episode(path) {
            self.reconcile_episode(library, path, cancel).await
        } else {
            self.reconcile_movie(library, path, cancel).await
        }
    }

    /// Find or create the movie stored for `path`.
    pub async fn reconcile_movie(
        &self,
        library: &Library,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let existing = cancellable(cancel, self.store.find_movie_by_path(library.id, path))
            .await
            .with_context(|| format!("find movie {}", path.display()))?;

        if let Some(mut movie) = existing {
            movie.item.touch(Utc::now());
            cancellable(cancel, self.store.update_movie(&movie))
                .await
                .with_context(|| format!("update movie {}", path.display()))?;
            tracing::debug!("Rescanned movie: {}", path.display());
            return Ok(Outcome::Refreshed);
        }

        let metadata = self.extract(path, cancel).await?;
        let info = parser::parse_movie(path);

        let mut query = SearchQuery::new(&info.title);
        if let Some(year) = info.year {
            query = query.year(year.to_string());
        }
        let matched = self.search_movie(&query, cancel).await?;

        let now = Utc::now();
        let mut movie = Movie {
            id: 0,
            item: LibraryItem::new(library.id, path.to_path_buf(), metadata.as_ref(), now),
            title: info.title.clone(),
            original_title: String::new(),
            tmdb_id: None,
            overview: String::new(),
            release_date: None,
            poster_path: None,
            backdrop_path: None,
            vote_average: 0.0,
            vote_count: 0,
        };
        if let Some(result) = matched {
            apply_movie_match(&mut movie, result);
        }

        let movie = cancellable(cancel, self.store.create_movie(movie))
            .await
            .with_context(|| format!("create movie {}", path.display()))?;

        tracing::info!(
            "Added movie '{}' (tmdb: {:?}): {}",
            movie.title,
            movie.tmdb_id,
            path.display()
        );
        Ok(Outcome::Created)
    }

    /// Find or create the episode stored for `path`, with its series and season.
    pub async fn reconcile_episode(
        &self,
        library: &Library,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let existing = cancellable(cancel, self.store.find_episode_by_path(library.id, path))
            .await
            .with_context(|| format!("find episode {}", path.display()))?;

        if let Some(mut episode) = existing {
            episode.item.touch(Utc::now());
            cancellable(cancel, self.store.update_episode(&episode))
                .await
                .with_context(|| format!("update episode {}", path.display()))?;
            tracing::debug!("Rescanned episode: {}", path.display());
            return Ok(Outcome::Refreshed);
        }

        let info = parser::parse_series_episode(path);
        if !info.is_parsed() {
            tracing::warn!(
                "Could not parse season/episode from {}, skipping",
                path.display()
            );
            return Ok(Outcome::Skipped);
        }

        let metadata = self.extract(path, cancel).await?;
        let matched = self
            .search_series(&SearchQuery::new(&info.title), cancel)
            .await?;

        let now = Utc::now();
        let (series, season) = {
            let _guard = self.series_lock.lock().await;
            let series = self
                .find_or_create_series(library, &info, matched, now, cancel)
                .await?;
            let season = self
                .find_or_create_season(library, &series, info.season, now, cancel)
                .await?;
            (series, season)
        };

        let episode = Episode {
            id: 0,
            item: LibraryItem::new(library.id, path.to_path_buf(), metadata.as_ref(), now),
            series_id: series.id,
            season_id: season.id,
            episode_number: info.episode,
            title: placeholder_episode_title(info.episode),
        };
        cancellable(cancel, self.store.create_episode(episode))
            .await
            .with_context(|| {
                format!(
                    "create episode S{:02}E{:02} of '{}'",
                    info.season, info.episode, series.title
                )
            })?;

        tracing::info!(
            "Added episode '{}' S{:02}E{:02}: {}",
            series.title,
            info.season,
            info.episode,
            path.display()
        );
        Ok(Outcome::Created)
    }

    /// Resolve the series by catalog id, then by title among unmatched
    /// series, and create it when neither exists.
    async fn find_or_create_series(
        &self,
        library: &Library,
        info: &EpisodeInfo,
        matched: Option<SeriesResult>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Series> {
        if let Some(result) = &matched {
            let found = cancellable(cancel, self.store.find_series_by_tmdb_id(library.id, result.id))
                .await
                .with_context(|| format!("find series tmdb:{}", result.id))?;
            if let Some(mut series) = found {
                series.last_scanned = now;
                cancellable(cancel, self.store.update_series(&series))
                    .await
                    .with_context(|| format!("update series '{}'", series.title))?;
                return Ok(series);
            }
        }

        let unmatched = cancellable(
            cancel,
            self.store
                .find_unmatched_series_by_title(library.id, &info.title),
        )
        .await
        .with_context(|| format!("find series '{}'", info.title))?;

        if let Some(mut series) = unmatched {
            if let Some(result) = matched {
                tracing::info!(
                    "Matched series '{}' to TMDB id {}",
                    series.title,
                    result.id
                );
                apply_series_match(&mut series, result);
            }
            series.last_scanned = now;
            cancellable(cancel, self.store.update_series(&series))
                .await
                .with_context(|| format!("update series '{}'", series.title))?;
            return Ok(series);
        }

        let mut series = Series {
            id: 0,
            library_id: library.id,
            title: info.title.clone(),
            original_title: String::new(),
            tmdb_id: None,
            overview: String::new(),
            first_air_date: None,
            poster_path: None,
            backdrop_path: None,
            vote_average: 0.0,
            vote_count: 0,
            date_added: now,
            last_scanned: now,
        };
        if let Some(result) = matched {
            apply_series_match(&mut series, result);
        }

        let series = cancellable(cancel, self.store.create_series(series))
            .await
            .with_context(|| format!("create series '{}'", info.title))?;
        tracing::info!("Added series '{}' (tmdb: {:?})", series.title, series.tmdb_id);
        Ok(series)
    }

    async fn find_or_create_season(
        &self,
        library: &Library,
        series: &Series,
        season_number: u32,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Season> {
        let found = cancellable(
            cancel,
            self.store.find_season_by_number(series.id, season_number),
        )
        .await
        .with_context(|| format!("find season {} of '{}'", season_number, series.title))?;

        if let Some(mut season) = found {
            season.last_scanned = now;
            cancellable(cancel, self.store.update_season(&season))
                .await
                .with_context(|| format!("update season {} of '{}'", season_number, series.title))?;
            return Ok(season);
        }

        let season = Season {
            id: 0,
            series_id: series.id,
            library_id: library.id,
            season_number,
            date_added: now,
            last_scanned: now,
        };
        cancellable(cancel, self.store.create_season(season))
            .await
            .with_context(|| format!("create season {} of '{}'", season_number, series.title))
    }

    /// Best-effort metadata extraction. Only cancellation is an error.
    async fn extract(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<MediaMetadata>> {
        match cancellable(cancel, self.extractor.extract(path)).await {
            Ok(report) => {
                if let Some(err) = &report.soft_error {
                    tracing::warn!("ffprobe reported an error for {}: {}", path.display(), err);
                }
                for warning in &report.metadata.warnings {
                    tracing::debug!("{}: {}", path.display(), warning);
                }
                Ok(Some(report.metadata))
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::warn!("Failed to extract metadata from {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// First ranked movie result, if the catalog is available and answers.
    async fn search_movie(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<MovieResult>> {
        let Some(catalog) = &self.catalog else {
            return Ok(None);
        };
        match cancellable(cancel, catalog.search_movie(query)).await {
            Ok(results) => Ok(results.into_first()),
            Err(e) => soft_catalog_failure(&query.query, e),
        }
    }

    /// First ranked series result, if the catalog is available and answers.
    async fn search_series(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<SeriesResult>> {
        let Some(catalog) = &self.catalog else {
            return Ok(None);
        };
        match cancellable(cancel, catalog.search_series(query)).await {
            Ok(results) => Ok(results.into_first()),
            Err(e) => soft_catalog_failure(&query.query, e),
        }
    }
}

/// Log a failed search and continue without a match.
fn soft_catalog_failure<T>(title: &str, err: Error) -> Result<Option<T>> {
    if err.is_cancelled() {
        return Err(err);
    }
    if err.is_transient() {
        tracing::warn!("TMDB unreachable while searching '{}': {}", title, err);
    } else {
        tracing::warn!("TMDB search for '{}' failed: {}", title, err);
    }
    Ok(None)
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value
        .filter(|v| !v.is_empty())
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

fn apply_movie_match(movie: &mut Movie, result: MovieResult) {
    if !result.title.is_empty() {
        movie.title = result.title;
    }
    movie.original_title = result.original_title;
    movie.tmdb_id = Some(result.id);
    movie.overview = result.overview;
    movie.release_date = parse_date(result.release_date.as_deref());
    movie.poster_path = result.poster_path;
    movie.backdrop_path = result.backdrop_path;
    movie.vote_average = result.vote_average;
    movie.vote_count = result.vote_count;
}

fn apply_series_match(series: &mut Series, result: SeriesResult) {
    if !result.name.is_empty() {
        series.title = result.name;
    }
    series.original_title = result.original_name;
    series.tmdb_id = Some(result.id);
    series.overview = result.overview;
    series.first_air_date = parse_date(result.first_air_date.as_deref());
    series.poster_path = result.poster_path;
    series.backdrop_path = result.backdrop_path;
    series.vote_average = result.vote_average;
    series.vote_count = result.vote_count;
}
