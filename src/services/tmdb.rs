//! TMDB API client.
//!
//! Only title search is used by the scanner. Matching is deliberately naive:
//! callers accept the first ranked result and nothing more.

use crate::models::config::TmdbConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// A page of search results.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults<T> {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

impl<T> SearchResults<T> {
    /// The accepted match: the first ranked result, if any.
    pub fn into_first(self) -> Option<T> {
        self.results.into_iter().next()
    }
}

/// Movie search item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieResult {
    pub id: u64,
    pub title: String,
    pub original_title: String,
    pub original_language: String,
    pub overview: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: u32,
    pub adult: bool,
    pub genre_ids: Vec<u64>,
}

/// TV show search item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeriesResult {
    pub id: u64,
    pub name: String,
    pub original_name: String,
    pub original_language: String,
    pub overview: String,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: u32,
    pub origin_country: Vec<String>,
    pub genre_ids: Vec<u64>,
}

/// Error body returned by TMDB on non-success responses.
#[derive(Debug, Deserialize)]
struct TmdbErrorBody {
    status_message: Option<String>,
    status_code: Option<i64>,
}

/// A title search with optional refinements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub page: u32,
    pub region: Option<String>,
    pub year: Option<String>,
    pub primary_release_year: Option<String>,
    pub first_air_date_year: Option<i32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            region: None,
            year: None,
            primary_release_year: None,
            first_air_date_year: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Restrict by year. Empty strings are ignored.
    pub fn year(mut self, year: impl Into<String>) -> Self {
        let year = year.into();
        if !year.trim().is_empty() {
            self.year = Some(year);
        }
        self
    }

    pub fn primary_release_year(mut self, year: impl Into<String>) -> Self {
        let year = year.into();
        if !year.trim().is_empty() {
            self.primary_release_year = Some(year);
        }
        self
    }

    /// Restrict TV searches by first air year. Only 4-digit years are kept.
    pub fn first_air_date_year(mut self, year: i32) -> Self {
        if (1000..=9999).contains(&year) {
            self.first_air_date_year = Some(year);
        }
        self
    }

    /// Query string parameters past the common ones.
    fn extra_params(&self) -> String {
        let mut params = format!(
            "&query={}&page={}",
            urlencoding::encode(&self.query),
            self.page
        );
        if let Some(region) = &self.region {
            params.push_str(&format!("&region={}", urlencoding::encode(region)));
        }
        if let Some(year) = &self.year {
            params.push_str(&format!("&year={}", urlencoding::encode(year)));
        }
        if let Some(year) = &self.primary_release_year {
            params.push_str(&format!(
                "&primary_release_year={}",
                urlencoding::encode(year)
            ));
        }
        if let Some(year) = self.first_air_date_year {
            params.push_str(&format!("&first_air_date_year={}", year));
        }
        params
    }
}

/// Search access to an external movie/TV catalog.
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    async fn search_movie(&self, query: &SearchQuery) -> Result<SearchResults<MovieResult>>;

    async fn search_series(&self, query: &SearchQuery) -> Result<SearchResults<SeriesResult>>;
}

/// TMDB API client.
#[derive(Debug, Clone)]
pub struct TmdbClient {
    config: TmdbConfig,
    token: String,
    client: reqwest::Client,
}

impl TmdbClient {
    /// Create a new client. Fails without a bearer token.
    pub fn new(config: TmdbConfig) -> Result<Self> {
        let token = config
            .bearer_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(Error::TmdbTokenMissing)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            config,
            token,
            client,
        })
    }

    /// Build a request with bearer authentication.
    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
    }

    /// Build URL with the common search parameters.
    fn build_url(&self, path: &str, extra_params: &str) -> String {
        format!(
            "{}/{}?language={}&include_adult={}{}",
            self.config.base_url.trim_end_matches('/'),
            path,
            urlencoding::encode(&self.config.language),
            self.config.include_adult,
            extra_params
        )
    }

    /// GET a URL and decode the JSON body.
    ///
    /// Non-success statuses become `Error::Catalog`; failures to reach the
    /// server stay `Error::Http`.
    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.build_request(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            return Err(catalog_error(status.as_u16(), &body));
        }

        Ok(resp.json().await?)
    }

    /// Verify the bearer token is valid.
    pub async fn verify_token(&self) -> Result<bool> {
        let url = format!(
            "{}/authentication",
            self.config.base_url.trim_end_matches('/')
        );
        let resp = self.build_request(&url).send().await?;
        Ok(resp.status().is_success())
    }
}

#[async_trait]
impl MetadataCatalog for TmdbClient {
    async fn search_movie(&self, query: &SearchQuery) -> Result<SearchResults<MovieResult>> {
        let url = self.build_url("search/movie", &query.extra_params());
        self.fetch(&url).await.map_err(|e| e.context("search movie"))
    }

    async fn search_series(&self, query: &SearchQuery) -> Result<SearchResults<SeriesResult>> {
        let url = self.build_url("search/tv", &query.extra_params());
        self.fetch(&url).await.map_err(|e| e.context("search TV show"))
    }
}

/// Map a non-success response to a catalog error.
fn catalog_error(status: u16, body: &[u8]) -> Error {
    match serde_json::from_slice::<TmdbErrorBody>(body) {
        Ok(parsed) => Error::Catalog {
            status,
            code: parsed.status_code,
            message: parsed
                .status_message
                .unwrap_or_else(|| format!("HTTP {}", status)),
        },
        Err(_) => Error::Catalog {
            status,
            code: None,
            message: format!("HTTP {}", status),
        },
    }
}
