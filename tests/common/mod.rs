//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use media_library::models::media::{AudioTrack, MediaMetadata};
use media_library::services::ffprobe::{MediaExtractor, ProbeReport};
use media_library::services::tmdb::{
    MetadataCatalog, MovieResult, SearchQuery, SearchResults, SeriesResult,
};
use media_library::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Extractor returning fixed metadata. Paths containing "corrupt" fail.
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn extract(&self, path: &Path) -> Result<ProbeReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path.to_string_lossy().contains("corrupt") {
            return Err(Error::Probe {
                path: path.display().to_string(),
                message: "Invalid data found when processing input".to_string(),
            });
        }
        Ok(ProbeReport {
            metadata: MediaMetadata {
                filename: path.display().to_string(),
                container: "matroska,webm".to_string(),
                codec: "h264".to_string(),
                resolution_width: 1920,
                resolution_height: 1080,
                audio_tracks: vec![AudioTrack {
                    channels: 6,
                    ..Default::default()
                }],
                ..Default::default()
            },
            soft_error: None,
        })
    }
}

/// Catalog answering from fixed tables, recording every query.
#[derive(Default)]
pub struct FakeCatalog {
    pub movies: HashMap<String, Vec<MovieResult>>,
    pub series: HashMap<String, Vec<SeriesResult>>,
    /// Answer every search with this provider error.
    pub fail: bool,
    pub queries: Mutex<Vec<SearchQuery>>,
}

impl FakeCatalog {
    pub fn with_movie(mut self, query: &str, id: u64, title: &str, release_date: &str) -> Self {
        self.movies.entry(query.to_string()).or_default().push(MovieResult {
            id,
            title: title.to_string(),
            original_title: title.to_string(),
            release_date: Some(release_date.to_string()),
            overview: format!("{} overview", title),
            ..Default::default()
        });
        self
    }

    pub fn with_series(mut self, query: &str, id: u64, name: &str) -> Self {
        self.series.entry(query.to_string()).or_default().push(SeriesResult {
            id,
            name: name.to_string(),
            original_name: name.to_string(),
            first_air_date: Some("2008-01-20".to_string()),
            ..Default::default()
        });
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<SearchQuery> {
        self.queries.lock().unwrap().last().cloned()
    }

    fn record(&self, query: &SearchQuery) -> Result<()> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            return Err(Error::Catalog {
                status: 401,
                code: Some(7),
                message: "Invalid API key".to_string(),
            });
        }
        Ok(())
    }
}

fn page<T: Clone>(results: Option<&Vec<T>>) -> SearchResults<T> {
    let results = results.cloned().unwrap_or_default();
    SearchResults {
        page: 1,
        total_pages: 1,
        total_results: results.len() as u32,
        results,
    }
}

#[async_trait]
impl MetadataCatalog for FakeCatalog {
    async fn search_movie(&self, query: &SearchQuery) -> Result<SearchResults<MovieResult>> {
        self.record(query)?;
        Ok(page(self.movies.get(&query.query)))
    }

    async fn search_series(&self, query: &SearchQuery) -> Result<SearchResults<SeriesResult>> {
        self.record(query)?;
        Ok(page(self.series.get(&query.query)))
    }
}

/// Create an empty file (and its parents) under `root`.
pub fn touch(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, b"fake video").unwrap();
    path
}
