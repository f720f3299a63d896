//! Repository contract.
//!
//! Lookups return `Ok(None)` when nothing matches; absence is never an error.
//! Implementations handle their own concurrency and enforce the uniqueness
//! the reconciler relies on: one item per file path within a library, one
//! season number per series, one episode number per season.

pub mod memory;

use async_trait::async_trait;
use std::path::Path;

use crate::models::library::{EntityId, Episode, Library, Movie, Season, Series};
use crate::models::task::ScheduledTask;
use crate::Result;

pub use memory::MemoryStore;

#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn list_libraries(&self) -> Result<Vec<Library>>;

    async fn find_library(&self, id: EntityId) -> Result<Option<Library>>;

    async fn find_library_by_name(&self, name: &str) -> Result<Option<Library>>;

    /// Store a new library and return it with its id.
    async fn create_library(&self, library: Library) -> Result<Library>;

    async fn update_library(&self, library: &Library) -> Result<()>;
}

#[async_trait]
pub trait MovieRepository: Send + Sync {
    async fn find_movie_by_path(&self, library_id: EntityId, path: &Path) -> Result<Option<Movie>>;

    async fn find_movie(&self, id: EntityId) -> Result<Option<Movie>>;

    async fn list_movies(&self, library_id: EntityId) -> Result<Vec<Movie>>;

    async fn create_movie(&self, movie: Movie) -> Result<Movie>;

    async fn update_movie(&self, movie: &Movie) -> Result<()>;

    async fn delete_movie(&self, id: EntityId) -> Result<()>;
}

#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn find_series(&self, id: EntityId) -> Result<Option<Series>>;

    async fn find_series_by_tmdb_id(
        &self,
        library_id: EntityId,
        tmdb_id: u64,
    ) -> Result<Option<Series>>;

    /// Case-insensitive title lookup among series without a catalog id.
    async fn find_unmatched_series_by_title(
        &self,
        library_id: EntityId,
        title: &str,
    ) -> Result<Option<Series>>;

    async fn list_series(&self, library_id: EntityId) -> Result<Vec<Series>>;

    async fn create_series(&self, series: Series) -> Result<Series>;

    async fn update_series(&self, series: &Series) -> Result<()>;
}

#[async_trait]
pub trait SeasonRepository: Send + Sync {
    async fn find_season_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
    ) -> Result<Option<Season>>;

    async fn find_season(&self, id: EntityId) -> Result<Option<Season>>;

    async fn list_seasons(&self, series_id: EntityId) -> Result<Vec<Season>>;

    async fn create_season(&self, season: Season) -> Result<Season>;

    async fn update_season(&self, season: &Season) -> Result<()>;
}

#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn find_episode_by_path(
        &self,
        library_id: EntityId,
        path: &Path,
    ) -> Result<Option<Episode>>;

    async fn find_episode_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<Option<Episode>>;

    async fn find_episode(&self, id: EntityId) -> Result<Option<Episode>>;

    async fn list_episodes(&self, library_id: EntityId) -> Result<Vec<Episode>>;

    async fn create_episode(&self, episode: Episode) -> Result<Episode>;

    async fn update_episode(&self, episode: &Episode) -> Result<()>;

    async fn delete_episode(&self, id: EntityId) -> Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>>;

    async fn find_task_by_name(&self, name: &str) -> Result<Option<ScheduledTask>>;

    async fn create_task(&self, task: ScheduledTask) -> Result<ScheduledTask>;

    async fn update_task(&self, task: &ScheduledTask) -> Result<()>;
}

/// Durable storage of pending changes.
///
/// Entity writes may be buffered; task writes are durable on return.
#[async_trait]
pub trait Persist: Send + Sync {
    /// Write buffered changes. A no-op when nothing changed since the last
    /// successful write.
    async fn flush(&self) -> Result<()>;
}

/// Every entity repository behind one handle.
pub trait Store:
    LibraryRepository
    + MovieRepository
    + SeriesRepository
    + SeasonRepository
    + EpisodeRepository
    + TaskRepository
    + Persist
{
}

impl<T> Store for T where
    T: LibraryRepository
        + MovieRepository
        + SeriesRepository
        + SeasonRepository
        + EpisodeRepository
        + TaskRepository
        + Persist
{
}
