//! Integration tests for entity reconciliation.
//!
//! Tests cover:
//! - Movie creation from catalog matches and filename fallbacks
//! - Idempotent rescans keyed by file path
//! - Series → season → episode creation order and reuse
//! - Soft handling of probe and catalog failures

mod common;

use async_trait::async_trait;
use common::{FakeCatalog, FakeExtractor};
use media_library::core::reconciler::{Outcome, Reconciler};
use media_library::models::library::{
    EntityId, Episode, Library, LibraryKind, Movie, Season, Series,
};
use media_library::models::task::ScheduledTask;
use media_library::services::tmdb::MetadataCatalog;
use media_library::store::{
    EpisodeRepository, LibraryRepository, MemoryStore, MovieRepository, Persist,
    SeasonRepository, SeriesRepository, Store, TaskRepository,
};
use media_library::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Fixture {
    store: Arc<MemoryStore>,
    extractor: Arc<FakeExtractor>,
    catalog: Arc<FakeCatalog>,
    reconciler: Reconciler,
    movies: Library,
    series: Library,
}

async fn fixture(catalog: FakeCatalog) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let movies = store
        .create_library(Library::new("Movies", LibraryKind::Movie).with_path("/media/movies"))
        .await
        .unwrap();
    let series = store
        .create_library(Library::new("Series", LibraryKind::Series).with_path("/media/tv"))
        .await
        .unwrap();

    let extractor = Arc::new(FakeExtractor::default());
    let catalog = Arc::new(catalog);
    let reconciler = Reconciler::new(
        store.clone(),
        extractor.clone(),
        Some(catalog.clone() as Arc<dyn MetadataCatalog>),
    );

    Fixture {
        store,
        extractor,
        catalog,
        reconciler,
        movies,
        series,
    }
}

// ========== MOVIE TESTS ==========

#[tokio::test]
async fn test_movie_created_from_catalog_match() {
    let f = fixture(FakeCatalog::default().with_movie("Inception", 27205, "Inception", "2010-07-15")).await;
    let path = Path::new("/media/movies/Inception (2010)/Inception (2010).mkv");

    let outcome = f
        .reconciler
        .reconcile(&f.movies, path, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Created);

    let query = f.catalog.last_query().unwrap();
    assert_eq!(query.query, "Inception");
    assert_eq!(query.year.as_deref(), Some("2010"));

    let movie = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();
    assert_eq!(movie.title, "Inception");
    assert_eq!(movie.tmdb_id, Some(27205));
    assert_eq!(movie.overview, "Inception overview");
    assert_eq!(
        movie.release_date,
        chrono::NaiveDate::from_ymd_opt(2010, 7, 15)
    );
    assert_eq!(movie.item.codec, "h264");
    assert_eq!(movie.item.resolution_height, 1080);
    assert_eq!(movie.item.audio_channels, 6);
    assert_eq!(movie.item.date_added, movie.item.last_scanned);
}

#[tokio::test]
async fn test_movie_takes_first_ranked_result() {
    let catalog = FakeCatalog::default()
        .with_movie("Heat", 949, "Heat", "1995-12-15")
        .with_movie("Heat", 1_000_001, "Heat 2", "2026-01-01");
    let f = fixture(catalog).await;
    let path = Path::new("/media/movies/Heat (1995).mkv");

    f.reconciler
        .reconcile(&f.movies, path, &CancellationToken::new())
        .await
        .unwrap();

    let movie = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();
    assert_eq!(movie.tmdb_id, Some(949));
}

#[tokio::test]
async fn test_movie_without_match_uses_filename() {
    let f = fixture(FakeCatalog::default()).await;
    let path = Path::new("/media/movies/Unknown.Movie.mkv");

    f.reconciler
        .reconcile(&f.movies, path, &CancellationToken::new())
        .await
        .unwrap();

    let query = f.catalog.last_query().unwrap();
    assert_eq!(query.year, None);

    let movie = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();
    assert_eq!(movie.title, "Unknown Movie");
    assert_eq!(movie.tmdb_id, None);
}

#[tokio::test]
async fn test_rescan_only_refreshes() {
    let f = fixture(FakeCatalog::default().with_movie("Inception", 27205, "Inception", "2010-07-15")).await;
    let path = Path::new("/media/movies/Inception (2010).mkv");
    let cancel = CancellationToken::new();

    f.reconciler.reconcile(&f.movies, path, &cancel).await.unwrap();
    let first = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();

    let outcome = f.reconciler.reconcile(&f.movies, path, &cancel).await.unwrap();
    assert_eq!(outcome, Outcome::Refreshed);

    let movies = f.store.list_movies(f.movies.id).await.unwrap();
    assert_eq!(movies.len(), 1);
    let second = &movies[0];
    assert_eq!(second.id, first.id);
    assert_eq!(second.item.date_added, first.item.date_added);
    assert!(second.item.last_scanned >= first.item.last_scanned);

    // Rescans are never matched or probed again
    assert_eq!(f.catalog.query_count(), 1);
    assert_eq!(f.extractor.calls(), 1);
}

#[tokio::test]
async fn test_same_title_different_files_are_separate_movies() {
    let f = fixture(FakeCatalog::default().with_movie("Heat", 949, "Heat", "1995-12-15")).await;
    let cancel = CancellationToken::new();

    for path in [
        "/media/movies/Heat (1995) 1080p.mkv",
        "/media/movies/Heat (1995) 2160p.mkv",
    ] {
        f.reconciler
            .reconcile(&f.movies, Path::new(path), &cancel)
            .await
            .unwrap();
    }

    let movies = f.store.list_movies(f.movies.id).await.unwrap();
    assert_eq!(movies.len(), 2);
    assert!(movies.iter().all(|m| m.tmdb_id == Some(949)));
}

#[tokio::test]
async fn test_catalog_failure_is_soft() {
    let f = fixture(FakeCatalog::failing()).await;
    let path = Path::new("/media/movies/Alien.1979.mkv");

    let outcome = f
        .reconciler
        .reconcile(&f.movies, path, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Created);

    let movie = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();
    assert_eq!(movie.title, "Alien");
    assert_eq!(movie.tmdb_id, None);
}

#[tokio::test]
async fn test_probe_failure_is_soft() {
    let f = fixture(FakeCatalog::default().with_movie("Heat", 949, "Heat", "1995-12-15")).await;
    let path = Path::new("/media/movies/corrupt/Heat (1995).mkv");

    f.reconciler
        .reconcile(&f.movies, path, &CancellationToken::new())
        .await
        .unwrap();

    let movie = f.store.find_movie_by_path(f.movies.id, path).await.unwrap().unwrap();
    assert_eq!(movie.tmdb_id, Some(949));
    assert_eq!(movie.item.codec, "");
    assert_eq!(movie.item.resolution_width, 0);
}

#[tokio::test]
async fn test_without_catalog_titles_come_from_filenames() {
    let store = Arc::new(MemoryStore::new());
    let library = store
        .create_library(Library::new("Movies", LibraryKind::Movie))
        .await
        .unwrap();
    let reconciler = Reconciler::new(store.clone(), Arc::new(FakeExtractor::default()), None);
    let path = Path::new("/m/The.Matrix.1999.1080p.mkv");

    reconciler
        .reconcile(&library, path, &CancellationToken::new())
        .await
        .unwrap();

    let movie = store.find_movie_by_path(library.id, path).await.unwrap().unwrap();
    assert_eq!(movie.title, "The Matrix");
}

#[tokio::test]
async fn test_cancelled_reconcile_stores_nothing() {
    let f = fixture(FakeCatalog::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = f
        .reconciler
        .reconcile(&f.movies, Path::new("/media/movies/Heat (1995).mkv"), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(f.store.list_movies(f.movies.id).await.unwrap().is_empty());
}

// ========== EPISODE TESTS ==========

#[tokio::test]
async fn test_episode_creates_series_season_episode() {
    let f = fixture(FakeCatalog::default().with_series("Breaking Bad", 1396, "Breaking Bad")).await;
    let path = Path::new("/media/tv/Breaking Bad/Season 1/Breaking.Bad.S01E03.mkv");

    let outcome = f
        .reconciler
        .reconcile(&f.series, path, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Created);

    let series = f
        .store
        .find_series_by_tmdb_id(f.series.id, 1396)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(series.title, "Breaking Bad");
    assert_eq!(
        series.first_air_date,
        chrono::NaiveDate::from_ymd_opt(2008, 1, 20)
    );

    let season = f
        .store
        .find_season_by_number(series.id, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(season.library_id, f.series.id);

    let episode = f
        .store
        .find_episode_by_path(f.series.id, path)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(episode.series_id, series.id);
    assert_eq!(episode.season_id, season.id);
    assert_eq!(episode.episode_number, 3);
    assert_eq!(episode.title, "Episode 3");
    assert_eq!(episode.item.codec, "h264");

    // Parents are created before children
    assert!(series.id < season.id && season.id < episode.id);
}

#[tokio::test]
async fn test_episodes_share_series_and_season() {
    let f = fixture(FakeCatalog::default().with_series("Dark", 70523, "Dark")).await;
    let cancel = CancellationToken::new();

    for path in [
        "/media/tv/Dark/Dark.S01E01.mkv",
        "/media/tv/Dark/Dark.S01E02.mkv",
        "/media/tv/Dark/Dark.S02E01.mkv",
    ] {
        f.reconciler
            .reconcile(&f.series, Path::new(path), &cancel)
            .await
            .unwrap();
    }

    let series = f.store.list_series(f.series.id).await.unwrap();
    assert_eq!(series.len(), 1);
    let seasons = f.store.list_seasons(series[0].id).await.unwrap();
    assert_eq!(
        seasons.iter().map(|s| s.season_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(f.store.list_episodes(f.series.id).await.unwrap().len(), 3);

    let episode = f
        .store
        .find_episode_by_number(series[0].id, 1, 2)
        .await
        .unwrap()
        .unwrap();
    assert!(episode.item.file_path.ends_with("Dark.S01E02.mkv"));
}

#[tokio::test]
async fn test_series_identity_follows_catalog_id() {
    let catalog = FakeCatalog::default()
        .with_series("The Office US", 2316, "The Office")
        .with_series("The Office", 2316, "The Office");
    let f = fixture(catalog).await;
    let cancel = CancellationToken::new();

    f.reconciler
        .reconcile(&f.series, Path::new("/media/tv/The.Office.US.S01E01.mkv"), &cancel)
        .await
        .unwrap();
    f.reconciler
        .reconcile(&f.series, Path::new("/media/tv/The Office - 1x02.mkv"), &cancel)
        .await
        .unwrap();

    let series = f.store.list_series(f.series.id).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].tmdb_id, Some(2316));
}

#[tokio::test]
async fn test_unmatched_series_is_matched_later() {
    let store = Arc::new(MemoryStore::new());
    let library = store
        .create_library(Library::new("Series", LibraryKind::Series))
        .await
        .unwrap();
    let cancel = CancellationToken::new();

    // Catalog down on the first scan
    let offline = Reconciler::new(
        store.clone(),
        Arc::new(FakeExtractor::default()),
        Some(Arc::new(FakeCatalog::failing())),
    );
    offline
        .reconcile(&library, Path::new("/tv/Severance.S01E01.mkv"), &cancel)
        .await
        .unwrap();
    let unmatched = store.list_series(library.id).await.unwrap();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].tmdb_id, None);

    let online = Reconciler::new(
        store.clone(),
        Arc::new(FakeExtractor::default()),
        Some(Arc::new(
            FakeCatalog::default().with_series("Severance", 95396, "Severance"),
        )),
    );
    online
        .reconcile(&library, Path::new("/tv/Severance.S01E02.mkv"), &cancel)
        .await
        .unwrap();

    let series = store.list_series(library.id).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].id, unmatched[0].id);
    assert_eq!(series[0].tmdb_id, Some(95396));
    assert_eq!(store.list_seasons(series[0].id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unparseable_episode_is_skipped() {
    let f = fixture(FakeCatalog::default()).await;

    let outcome = f
        .reconciler
        .reconcile(
            &f.series,
            Path::new("/media/tv/Show Name/Show Name - Pilot.mkv"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Skipped);
    assert!(f.store.list_series(f.series.id).await.unwrap().is_empty());
    assert!(f.store.list_episodes(f.series.id).await.unwrap().is_empty());
    assert_eq!(f.catalog.query_count(), 0);
}

#[tokio::test]
async fn test_episode_marker_in_movie_library_takes_episode_path() {
    let f = fixture(FakeCatalog::default()).await;

    f.reconciler
        .reconcile(
            &f.movies,
            Path::new("/media/movies/Show.Name.S02E05.mkv"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(f.store.list_movies(f.movies.id).await.unwrap().is_empty());
    assert_eq!(f.store.list_episodes(f.movies.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_episode_number_fails_only_that_file() {
    let f = fixture(FakeCatalog::default()).await;
    let cancel = CancellationToken::new();

    f.reconciler
        .reconcile(&f.series, Path::new("/media/tv/Show.S01E01.mkv"), &cancel)
        .await
        .unwrap();
    let err = f
        .reconciler
        .reconcile(&f.series, Path::new("/media/tv/Show.S01E01.PROPER.mkv"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err.root(), Error::Conflict(_)));
    assert_eq!(f.store.list_episodes(f.series.id).await.unwrap().len(), 1);
}

// ========== PARTIAL FAILURE TESTS ==========

/// Store that refuses to create episodes.
struct NoEpisodes(MemoryStore);

#[async_trait]
impl LibraryRepository for NoEpisodes {
    async fn list_libraries(&self) -> Result<Vec<Library>> {
        self.0.list_libraries().await
    }
    async fn find_library(&self, id: EntityId) -> Result<Option<Library>> {
        self.0.find_library(id).await
    }
    async fn find_library_by_name(&self, name: &str) -> Result<Option<Library>> {
        self.0.find_library_by_name(name).await
    }
    async fn create_library(&self, library: Library) -> Result<Library> {
        self.0.create_library(library).await
    }
    async fn update_library(&self, library: &Library) -> Result<()> {
        self.0.update_library(library).await
    }
}

#[async_trait]
impl MovieRepository for NoEpisodes {
    async fn find_movie_by_path(&self, library_id: EntityId, path: &Path) -> Result<Option<Movie>> {
        self.0.find_movie_by_path(library_id, path).await
    }
    async fn find_movie(&self, id: EntityId) -> Result<Option<Movie>> {
        self.0.find_movie(id).await
    }
    async fn list_movies(&self, library_id: EntityId) -> Result<Vec<Movie>> {
        self.0.list_movies(library_id).await
    }
    async fn create_movie(&self, movie: Movie) -> Result<Movie> {
        self.0.create_movie(movie).await
    }
    async fn update_movie(&self, movie: &Movie) -> Result<()> {
        self.0.update_movie(movie).await
    }
    async fn delete_movie(&self, id: EntityId) -> Result<()> {
        self.0.delete_movie(id).await
    }
}

#[async_trait]
impl SeriesRepository for NoEpisodes {
    async fn find_series(&self, id: EntityId) -> Result<Option<Series>> {
        self.0.find_series(id).await
    }
    async fn find_series_by_tmdb_id(
        &self,
        library_id: EntityId,
        tmdb_id: u64,
    ) -> Result<Option<Series>> {
        self.0.find_series_by_tmdb_id(library_id, tmdb_id).await
    }
    async fn find_unmatched_series_by_title(
        &self,
        library_id: EntityId,
        title: &str,
    ) -> Result<Option<Series>> {
        self.0.find_unmatched_series_by_title(library_id, title).await
    }
    async fn list_series(&self, library_id: EntityId) -> Result<Vec<Series>> {
        self.0.list_series(library_id).await
    }
    async fn create_series(&self, series: Series) -> Result<Series> {
        self.0.create_series(series).await
    }
    async fn update_series(&self, series: &Series) -> Result<()> {
        self.0.update_series(series).await
    }
}

#[async_trait]
impl SeasonRepository for NoEpisodes {
    async fn find_season_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
    ) -> Result<Option<Season>> {
        self.0.find_season_by_number(series_id, season_number).await
    }
    async fn find_season(&self, id: EntityId) -> Result<Option<Season>> {
        self.0.find_season(id).await
    }
    async fn list_seasons(&self, series_id: EntityId) -> Result<Vec<Season>> {
        self.0.list_seasons(series_id).await
    }
    async fn create_season(&self, season: Season) -> Result<Season> {
        self.0.create_season(season).await
    }
    async fn update_season(&self, season: &Season) -> Result<()> {
        self.0.update_season(season).await
    }
}

#[async_trait]
impl EpisodeRepository for NoEpisodes {
    async fn find_episode_by_path(
        &self,
        library_id: EntityId,
        path: &Path,
    ) -> Result<Option<Episode>> {
        self.0.find_episode_by_path(library_id, path).await
    }
    async fn find_episode_by_number(
        &self,
        series_id: EntityId,
        season_number: u32,
        episode_number: u32,
    ) -> Result<Option<Episode>> {
        self.0
            .find_episode_by_number(series_id, season_number, episode_number)
            .await
    }
    async fn find_episode(&self, id: EntityId) -> Result<Option<Episode>> {
        self.0.find_episode(id).await
    }
    async fn list_episodes(&self, library_id: EntityId) -> Result<Vec<Episode>> {
        self.0.list_episodes(library_id).await
    }
    async fn create_episode(&self, _episode: Episode) -> Result<Episode> {
        Err(Error::other("disk full"))
    }
    async fn update_episode(&self, episode: &Episode) -> Result<()> {
        self.0.update_episode(episode).await
    }
    async fn delete_episode(&self, id: EntityId) -> Result<()> {
        self.0.delete_episode(id).await
    }
}

#[async_trait]
impl TaskRepository for NoEpisodes {
    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.0.list_tasks().await
    }
    async fn find_task_by_name(&self, name: &str) -> Result<Option<ScheduledTask>> {
        self.0.find_task_by_name(name).await
    }
    async fn create_task(&self, task: ScheduledTask) -> Result<ScheduledTask> {
        self.0.create_task(task).await
    }
    async fn update_task(&self, task: &ScheduledTask) -> Result<()> {
        self.0.update_task(task).await
    }
}

#[async_trait]
impl Persist for NoEpisodes {
    async fn flush(&self) -> Result<()> {
        self.0.flush().await
    }
}

#[tokio::test]
async fn test_episode_failure_keeps_parents() {
    let store = Arc::new(NoEpisodes(MemoryStore::new()));
    let library = store
        .create_library(Library::new("Series", LibraryKind::Series))
        .await
        .unwrap();
    let shared: Arc<dyn Store> = store.clone();
    let reconciler = Reconciler::new(
        shared,
        Arc::new(FakeExtractor::default()),
        Some(Arc::new(
            FakeCatalog::default().with_series("Andor", 83867, "Andor"),
        )),
    );

    let err = reconciler
        .reconcile(
            &library,
            Path::new("/tv/Andor.S01E01.mkv"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("create episode S01E01 of 'Andor'"));

    // Series and season persist with zero episodes
    let series = store.list_series(library.id).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].tmdb_id, Some(83867));
    let seasons = store.list_seasons(series[0].id).await.unwrap();
    assert_eq!(seasons.len(), 1);
    assert_eq!(seasons[0].series_id, series[0].id);
    assert!(store.list_episodes(library.id).await.unwrap().is_empty());
}
