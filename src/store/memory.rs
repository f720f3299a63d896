//! In-memory store with optional JSON snapshot persistence.
//!
//! All entities live in one state guarded by an async `RwLock`. Entity writes
//! change memory only and bump a revision; `flush` writes the snapshot (temp
//! file then rename) outside the write lock. Task writes are durable: the
//! snapshot is written before the change becomes visible, and a failed write
//! leaves the store unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{
    EpisodeRepository, LibraryRepository, MovieRepository, Persist, SeasonRepository,
    SeriesRepository, TaskRepository,
};
use crate::models::library::{EntityId, Episode, Library, Movie, Season, Series};
use crate::models::task::ScheduledTask;
use crate::{Error, Result, ResultExt};

/// `(library id, file path)`, the identity of a movie or episode file.
type PathKey = (EntityId, PathBuf);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: EntityId,
    libraries: BTreeMap<EntityId, Library>,
    movies: BTreeMap<EntityId, Movie>,
    series: BTreeMap<EntityId, Series>,
    seasons: BTreeMap<EntityId, Season>,
    episodes: BTreeMap<EntityId, Episode>,
    tasks: BTreeMap<EntityId, ScheduledTask>,
    #[serde(skip)]
    movie_paths: HashMap<PathKey, EntityId>,
    #[serde(skip)]
    episode_paths: HashMap<PathKey, EntityId>,
    /// Bumped by every change.
    #[serde(skip)]
    revision: u64,
}

impl StoreState {
    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }

    /// Rebuild the path indexes after loading a snapshot.
    fn reindex(&mut self) {
        self.movie_paths = self
            .movies
            .values()
            .map(|m| ((m.item.library_id, m.item.file_path.clone()), m.id))
            .collect();
        self.episode_paths = self
            .episodes
            .values()
            .map(|e| ((e.item.library_id, e.item.file_path.clone()), e.id))
            .collect();
    }
}

/// Replace an existing entity, failing if the id is unknown.
fn replace<T: Clone>(
    map: &mut BTreeMap<EntityId, T>,
    id: EntityId,
    value: &T,
    kind: &str,
) -> Result<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(())
        }
        None => Err(Error::MissingEntity(format!("{} {}", kind, id))),
    }
}

/// Move an id to a new key in a path index. The new key must be free.
fn move_path(
    index: &mut HashMap<PathKey, EntityId>,
    old: PathKey,
    new: PathKey,
    id: EntityId,
    kind: &str,
) -> Result<()> {
    if old == new {
        return Ok(());
    }
    if index.contains_key(&new) {
        return Err(Error::Conflict(format!(
            "{} for {} exists",
            kind,
            new.1.display()
        )));
    }
    index.remove(&old);
    index.insert(new, id);
    Ok(())
}

async fn write_snapshot(path: &Path, content: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Store implementing every repository trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot: Option<PathBuf>,
    /// Serializes snapshot writes.
    writer: Mutex<()>,
    /// Revision of the last snapshot written.
    flushed: AtomicU64,
}

impl MemoryStore {
    /// A purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted at `path`, loading the snapshot if present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state: StoreState = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            serde_json::from_slice(&content).map_err(|e| {
                Error::from(e).context(format!("read store snapshot {}", path.display()))
            })?
        } else {
            StoreState::default()
        };
        state.reindex();

        tracing::debug!("Opened store at {}", path.display());
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path),
            ..Self::default()
        })
    }

    /// Apply a change in memory. The snapshot is written by `flush`.
    ///
    /// `f` must validate before it changes anything: an error leaves the
    /// state as it was.
    async fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut StoreState) -> Result<R> + Send,
        R: Send,
    {
        let mut state = self.state.write().await;
        let result = f(&mut state)?;
        state.revision += 1;
        Ok(result)
    }

    /// Apply a change to a copy, write the snapshot, then publish the copy.
    async fn mutate_durable<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut StoreState) -> Result<R> + Send,
        R: Send,
    {
        let Some(path) = &self.snapshot else {
            return self.mutate(f).await;
        };

        let _writer = self.writer.lock().await;
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let result = f(&mut next)?;
        next.revision += 1;

        let content = serde_json::to_vec_pretty(&next)?;
        write_snapshot(path, content)
            .await
            .context("write store snapshot")?;

        self.flushed.store(next.revision, Ordering::SeqCst);
        *state = next;
        Ok(result)
    }
}

#[async_trait]
impl Persist for MemoryStore {
    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let _writer = self.writer.lock().await;
        let (revision, content) = {
            let state = self.state.read().await;
            if state.revision == self.flushed.load(Ordering::SeqCst) {
                return Ok(());
            }
            (state.revision, serde_json::to_vec_pretty(&*state)?)
        };

        write_snapshot(path, content)
            .await
            .context("write store snapshot")?;
        self.flushed.store(revision, Ordering::SeqCst);
        tracing::debug!("Wrote store snapshot {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl LibraryRepository for MemoryStore {
    async fn list_libraries(&self) -> Result<Vec<Library>> {
        Ok(self.state.read().await.libraries.values().cloned().collect())
    }

    async fn find_library(&self, id: EntityId) -> Result<Option<Library>> {
        Ok(self.state.read().await.libraries.get(&id).cloned())
    }

    async fn find_library_by_name(&self, name: &str) -> Result<Option<Library>> {
        let state = self.state.read().await;
        Ok(state.libraries.values().find(|l| l.name == name).cloned())
    }

    async fn create_library(&self, mut library: Library) -> Result<Library> {
        self.mutate(move |state| {
            if state.libraries.values().any(|l| l.name == library.name) {
                return Err(Error::Conflict(format!("library '{}' exists", library.name)));
            }
            library.id = state.allocate_id();
            state.libraries.insert(library.id, library.clone());
            Ok(library)
        })
        .await
    }

    async fn update_library(&self, library: &Library) -> Result<()> {
        self.mutate(|state| replace(&mut state.libraries, library.id, library, "library"))
            .await
    }
}

#[async_trait]
impl MovieRepository for MemoryStore {
    async fn find_movie_by_path(&self, library_id: EntityId, path: &Path) -> Result<Option<Movie>> {
        let state = self.state.read().await;
        Ok(state
            .movie_paths
            .get(&(library_id, path.to_path_buf()))
            .and_then(|id| state.movies.get(id))
            .cloned())
    }

    async fn find_movie(&self, id: EntityId) -> Result<Option<Movie>> {
        Ok(self.state.read().await.movies.get(&id).cloned())
    }

    async fn list_movies(&self, library_id: EntityId) -> Result<Vec<Movie>> {
        let state = self.state.read().await;
        Ok(state
            .movies
            .values()
            .filter(|m| m.item.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn create_movie(&self, mut movie: Movie) -> Result<Movie> {
        self.mutate(move |state| {
            let key = (movie.item.library_id, movie.item.file_path.clone());
            if state.movie_paths.contains_key(&key) {
                return Err(Error::Conflict(format!(
                    "movie for {} exists",
                    movie.item.file_path.display()
                )));
            }
            movie.id = state.allocate_id();
            state.movie_paths.insert(key, movie.id);
            state.movies.insert(movie.id, movie.clone());
            Ok(movie)
        })
        .await
    }

    async fn update_movie(&self, movie: &Movie) -> Result<()> {
        self.mutate(|state| {
            let Some(old) = state.movies.get(&movie.id) else {
                return Err(Error::MissingEntity(format!("movie {}", movie.id)));
            };
            let old_key = (old.item.library_id, old.item.file_path.clone());
            let new_key = (movie.item.library_id, movie.item.file_path.clone());
            move_path(&mut state.movie_paths, old_key, new_key, movie.id, "movie")?;
            state.movies.insert(movie.id, movie.clone());
            Ok(())
        })
        .await
    }

    async fn delete_movie(&self, id: EntityId) -> Result<()> {
        self.mutate(|state| {
            if let Some(movie) = state.movies.remove(&id) {
                state
                    .movie_paths
                    .remove(&(movie.item.library_id, movie.item.file_path));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SeriesRepository for MemoryStore {
    async fn find_series(&self, id: EntityId) -> Result<Option<Series>> {
        Ok(self.state.read().await.series.get(&id).cloned())
    }

    async fn find_series_by_tmdb_id(
        &self,
        library_id: EntityId,
        tmdb_id: u64,
    ) -> Result<Option<Series>> {
        let state = self.state.read().await;
        Ok(state
            .series
            .values()
            .find(|s| s.library_id == library_id && s.tmdb_id == Some(tmdb_id))
            .cloned())
    }

    async fn find_unmatched_series_by_title(
        &self,
        library_id: EntityId,
        title: &str,
    ) -> Result<Option<Series>> {
        let state = self.state.read().await;
        Ok(state
            .series
            .values()
            .find(|s| {
                s.library_id == library_id
                    && s.tmdb_id.is_none()
                    && s.title.eq_ignore_ascii_case(title)
            })
            .cloned())
    }

    async fn list_series(&self, library_id: EntityId) -> Result<Vec<Series>> {
        let state = self.state.read().await;
        Ok(state
            .series
            .values()
            .filter(|s| s.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn create_series(&self, mut series: Series) -> Result<Series> {
        self.mutate(move |state| {
            series.id = state.allocate_id();
            state.series.insert(series.id, series.clone());
            Ok(series)
        })
        .await
    }

    async fn update_series(&self, series: &Series) -> Result<()> {
        self.mutate(|state| replace(&mut state.series, series.id, series, "series"))
            .await
    }
}

#[async_trait]
impl SeasonRepository for MemoryStore {
    async fn find_season_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
    ) -> Result<Option<Season>> {
        let state = self.state.read().await;
        Ok(state
            .seasons
            .values()
            .find(|s| s.series_id == series_id && s.season_number == season_number)
            .cloned())
    }

    async fn find_season(&self, id: EntityId) -> Result<Option<Season>> {
        Ok(self.state.read().await.seasons.get(&id).cloned())
    }

    async fn list_seasons(&self, series_id: EntityId) -> Result<Vec<Season>> {
        let state = self.state.read().await;
        let mut seasons: Vec<Season> = state
            .seasons
            .values()
            .filter(|s| s.series_id == series_id)
            .cloned()
            .collect();
        seasons.sort_by_key(|s| s.season_number);
        Ok(seasons)
    }

    async fn create_season(&self, mut season: Season) -> Result<Season> {
        self.mutate(move |state| {
            if !state.series.contains_key(&season.series_id) {
                return Err(Error::MissingEntity(format!("series {}", season.series_id)));
            }
            let duplicate = state.seasons.values().any(|s| {
                s.series_id == season.series_id && s.season_number == season.season_number
            });
            if duplicate {
                return Err(Error::Conflict(format!(
                    "season {} of series {} exists",
                    season.season_number, season.series_id
                )));
            }
            season.id = state.allocate_id();
            state.seasons.insert(season.id, season.clone());
            Ok(season)
        })
        .await
    }

    async fn update_season(&self, season: &Season) -> Result<()> {
        self.mutate(|state| replace(&mut state.seasons, season.id, season, "season"))
            .await
    }
}

#[async_trait]
impl EpisodeRepository for MemoryStore {
    async fn find_episode_by_path(
        &self,
        library_id: EntityId,
        path: &Path,
    ) -> Result<Option<Episode>> {
        let state = self.state.read().await;
        Ok(state
            .episode_paths
            .get(&(library_id, path.to_path_buf()))
            .and_then(|id| state.episodes.get(id))
            .cloned())
    }

    async fn find_episode_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<Option<Episode>> {
        let state = self.state.read().await;
        let Some(season) = state
            .seasons
            .values()
            .find(|s| s.series_id == series_id && s.season_number == season_number)
        else {
            return Ok(None);
        };
        Ok(state
            .episodes
            .values()
            .find(|e| e.season_id == season.id && e.episode_number == episode_number)
            .cloned())
    }

    async fn find_episode(&self, id: EntityId) -> Result<Option<Episode>> {
        Ok(self.state.read().await.episodes.get(&id).cloned())
    }

    async fn list_episodes(&self, library_id: EntityId) -> Result<Vec<Episode>> {
        let state = self.state.read().await;
        Ok(state
            .episodes
            .values()
            .filter(|e| e.item.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn create_episode(&self, mut episode: Episode) -> Result<Episode> {
        self.mutate(move |state| {
            if !state.seasons.contains_key(&episode.season_id) {
                return Err(Error::MissingEntity(format!("season {}", episode.season_id)));
            }
            let key = (episode.item.library_id, episode.item.file_path.clone());
            if state.episode_paths.contains_key(&key) {
                return Err(Error::Conflict(format!(
                    "episode for {} exists",
                    episode.item.file_path.display()
                )));
            }
            let same_number = state.episodes.values().any(|e| {
                e.season_id == episode.season_id && e.episode_number == episode.episode_number
            });
            if same_number {
                return Err(Error::Conflict(format!(
                    "episode {} of season {} exists",
                    episode.episode_number, episode.season_id
                )));
            }
            episode.id = state.allocate_id();
            state.episode_paths.insert(key, episode.id);
            state.episodes.insert(episode.id, episode.clone());
            Ok(episode)
        })
        .await
    }

    async fn update_episode(&self, episode: &Episode) -> Result<()> {
        self.mutate(|state| {
            let Some(old) = state.episodes.get(&episode.id) else {
                return Err(Error::MissingEntity(format!("episode {}", episode.id)));
            };
            let old_key = (old.item.library_id, old.item.file_path.clone());
            let new_key = (episode.item.library_id, episode.item.file_path.clone());
            move_path(&mut state.episode_paths, old_key, new_key, episode.id, "episode")?;
            state.episodes.insert(episode.id, episode.clone());
            Ok(())
        })
        .await
    }

    async fn delete_episode(&self, id: EntityId) -> Result<()> {
        self.mutate(|state| {
            if let Some(episode) = state.episodes.remove(&id) {
                state
                    .episode_paths
                    .remove(&(episode.item.library_id, episode.item.file_path));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.state.read().await.tasks.values().cloned().collect())
    }

    async fn find_task_by_name(&self, name: &str) -> Result<Option<ScheduledTask>> {
        let state = self.state.read().await;
        Ok(state.tasks.values().find(|t| t.name == name).cloned())
    }

    async fn create_task(&self, mut task: ScheduledTask) -> Result<ScheduledTask> {
        self.mutate_durable(move |state| {
            if state.tasks.values().any(|t| t.name == task.name) {
                return Err(Error::Conflict(format!("task '{}' exists", task.name)));
            }
            task.id = state.allocate_id();
            state.tasks.insert(task.id, task.clone());
            Ok(task)
        })
        .await
    }

    async fn update_task(&self, task: &ScheduledTask) -> Result<()> {
        self.mutate_durable(|state| replace(&mut state.tasks, task.id, task, "task"))
            .await
    }
}
