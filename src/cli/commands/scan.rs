//! Scan command implementation.
//!
//! One-shot scan of all auto-scan libraries, or of the named ones.

use crate::app::App;
use crate::core::scanner::{LibraryScanReport, ScanReport};
use crate::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scan libraries and print a summary. Ctrl-C cancels the scan.
pub async fn scan(app: &App, libraries: &[String]) -> Result<()> {
    println!("{}", "🔍 Scanning libraries...".bold().cyan());
    println!();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Reconciling files...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = if libraries.is_empty() {
        app.scanner.scan_libraries(&cancel).await
    } else {
        app.scanner.scan_named(libraries, &cancel).await
    };

    spinner.finish_and_clear();
    watcher.abort();

    let report = result?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    if report.libraries.is_empty() {
        println!("No libraries to scan. Configure [scanner].movie_dirs or series_dirs.");
        return;
    }

    println!(
        "{:<20} {:>8} {:>8} {:>10} {:>8} {:>8}",
        "Library".bold(),
        "Files".bold(),
        "New".bold(),
        "Rescanned".bold(),
        "Skipped".bold(),
        "Failed".bold()
    );
    println!("{}", "-".repeat(68));
    for library in &report.libraries {
        print_row(library);
    }
    println!("{}", "-".repeat(68));
    print_row(&report.total());
    println!();

    let total = report.total();
    if total.path_errors > 0 {
        println!(
            "{} {} library paths could not be read",
            "[WARN]".yellow(),
            total.path_errors
        );
    }
    for failed in report.libraries.iter().filter(|l| l.persist_error.is_some()) {
        println!(
            "{} Results for '{}' were not saved: {}",
            "[ERROR]".red(),
            failed.library,
            failed.persist_error.as_deref().unwrap_or_default()
        );
    }
    if report.cancelled() {
        println!(
            "{} Scan cancelled, {} files not processed",
            "[WARN]".yellow(),
            total.aborted
        );
    } else if report.persist_failure().is_some() {
        println!("{} Scan finished but not saved", "[WARN]".yellow());
    } else if total.failed > 0 {
        println!("{} {} files failed, see log", "[WARN]".yellow(), total.failed);
    } else {
        println!("{}", "✅ Scan complete".green());
    }
}

fn print_row(row: &LibraryScanReport) {
    println!(
        "{:<20} {:>8} {:>8} {:>10} {:>8} {:>8}",
        row.library, row.discovered, row.created, row.refreshed, row.skipped, row.failed
    );
}
