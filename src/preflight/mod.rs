//! Preflight checks module.

mod ffprobe;
mod tmdb;

use crate::models::config::Config;
use colored::Colorize;

/// Result of a preflight check.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    /// Passed, but with reduced functionality.
    pub degraded: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            degraded: false,
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn warn(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            degraded: true,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn fail(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            degraded: false,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }
}

/// Run all preflight checks.
pub async fn run_preflight_checks(config: &Config) -> Vec<CheckResult> {
    vec![ffprobe::check(config).await, tmdb::check(config).await]
}

/// Print preflight check results.
pub fn print_results(results: &[CheckResult]) {
    for result in results {
        let marker = match (result.success, result.degraded) {
            (true, false) => "[OK]".green(),
            (true, true) => "[WARN]".yellow(),
            (false, _) => "[FAIL]".red(),
        };
        println!("{} {}: {}", marker, result.name.bold(), result.message);
        if let Some(ref hint) = result.hint {
            println!("  {} {}", "->".yellow(), hint);
        }
    }
}

/// Check if all preflight checks passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.success)
}
