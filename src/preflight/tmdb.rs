//! TMDB API preflight check.

use super::CheckResult;
use crate::models::config::Config;
use crate::services::tmdb::TmdbClient;

/// Check if the TMDB API accepts the configured token.
///
/// A missing token only degrades scanning to filename titles.
pub async fn check(config: &Config) -> CheckResult {
    match TmdbClient::new(config.tmdb.clone()) {
        Ok(client) => match client.verify_token().await {
            Ok(true) => CheckResult::ok("TMDB API", "connected"),
            Ok(false) => CheckResult::fail(
                "TMDB API",
                "invalid bearer token",
                "Check TMDB_BEARER_TOKEN or [tmdb].bearer_token",
            ),
            Err(_) => CheckResult::fail(
                "TMDB API",
                "connection failed",
                "Check your network connection",
            ),
        },
        Err(_) => CheckResult::warn(
            "TMDB API",
            "bearer token not configured, titles will come from filenames",
            "Set TMDB_BEARER_TOKEN or [tmdb].bearer_token",
        ),
    }
}
