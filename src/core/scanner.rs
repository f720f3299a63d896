//! Library scanner.
//!
//! Walks the enabled roots of a library and feeds every video file into a
//! fixed-size pool of workers that hand each file to the reconciler. One bad
//! file or one unreadable root never aborts the rest of the scan.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::core::parser::{self, FileKind};
use crate::core::reconciler::{Outcome, Reconciler};
use crate::core::scheduler::{parse_task_config, TaskExecutor};
use crate::models::library::Library;
use crate::store::{Persist, Store};
use crate::{Error, Result};

/// Task type of the scanner executor.
pub const TASK_TYPE: &str = "scanner";

/// Counters for one library scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryScanReport {
    /// Library name.
    pub library: String,
    /// Video files found by the walk.
    pub discovered: usize,
    /// New movies or episodes stored.
    pub created: usize,
    /// Known paths re-stamped.
    pub refreshed: usize,
    /// Files that could not be identified.
    pub skipped: usize,
    /// Files whose reconciliation failed.
    pub failed: usize,
    /// Files abandoned because the scan was cancelled.
    pub aborted: usize,
    /// Roots that could not be walked.
    pub path_errors: usize,
    /// Whether the scan stopped before the walk finished.
    pub cancelled: bool,
    /// Why the results could not be saved, if they could not.
    pub persist_error: Option<String>,
}

impl LibraryScanReport {
    fn new(library: &str) -> Self {
        Self {
            library: library.to_string(),
            ..Default::default()
        }
    }

    fn merge(&mut self, other: &LibraryScanReport) {
        self.discovered += other.discovered;
        self.created += other.created;
        self.refreshed += other.refreshed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.aborted += other.aborted;
        self.path_errors += other.path_errors;
        self.cancelled |= other.cancelled;
        if self.persist_error.is_none() {
            self.persist_error = other.persist_error.clone();
        }
    }
}

/// Result of scanning several libraries.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub libraries: Vec<LibraryScanReport>,
}

impl ScanReport {
    /// Counters summed over all libraries.
    pub fn total(&self) -> LibraryScanReport {
        let mut total = LibraryScanReport::new("total");
        for library in &self.libraries {
            total.merge(library);
        }
        total
    }

    pub fn cancelled(&self) -> bool {
        self.libraries.iter().any(|l| l.cancelled)
    }

    /// The first library whose results could not be saved.
    pub fn persist_failure(&self) -> Option<&LibraryScanReport> {
        self.libraries.iter().find(|l| l.persist_error.is_some())
    }
}

/// Outcome of walking the roots of one library.
#[derive(Debug, Default)]
struct WalkSummary {
    discovered: usize,
    path_errors: usize,
    cancelled: bool,
}

/// Check that a scan root exists and is a directory.
fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::PathNotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(Error::NotADirectory(path.display().to_string()));
    }
    Ok(())
}

/// Walk `roots` and send every video file to `tx`.
///
/// Runs on a blocking thread. Stops early when the token fires or every
/// receiver is gone.
fn walk_roots(
    roots: &[PathBuf],
    tx: &mpsc::Sender<PathBuf>,
    cancel: &CancellationToken,
) -> WalkSummary {
    let mut summary = WalkSummary::default();

    for root in roots {
        if let Err(e) = ensure_directory(root) {
            tracing::error!("Skipping library path {}: {}", root.display(), e);
            summary.path_errors += 1;
            continue;
        }

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return summary;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        tracing::error!("Failed to walk {}: {}", root.display(), e);
                        summary.path_errors += 1;
                    } else {
                        tracing::warn!("Failed to read entry under {}: {}", root.display(), e);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if parser::classify_file(entry.path()) == FileKind::Ignored {
                tracing::debug!("Ignoring {}", entry.path().display());
                continue;
            }

            summary.discovered += 1;
            if tx.blocking_send(entry.into_path()).is_err() {
                summary.cancelled = true;
                return summary;
            }
        }
    }

    summary
}

/// Scans libraries into the store.
pub struct Scanner {
    store: Arc<dyn Store>,
    reconciler: Arc<Reconciler>,
    workers: usize,
}

impl Scanner {
    /// Create a scanner reconciling up to `workers` files at once.
    pub fn new(store: Arc<dyn Store>, reconciler: Arc<Reconciler>, workers: usize) -> Self {
        Self {
            store,
            reconciler,
            workers: workers.max(1),
        }
    }

    /// Scan every library with auto-scan enabled.
    pub async fn scan_libraries(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        let libraries = self.store.list_libraries().await?;
        let selected: Vec<Library> = libraries
            .into_iter()
            .filter(|library| {
                if !library.auto_scan {
                    tracing::debug!("Auto-scan disabled for library '{}'", library.name);
                }
                library.auto_scan
            })
            .collect();
        self.scan_each(selected, cancel).await
    }

    /// Scan the named libraries, regardless of their auto-scan flag.
    pub async fn scan_named(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            match self.store.find_library_by_name(name).await? {
                Some(library) => selected.push(library),
                None => return Err(Error::MissingEntity(format!("library '{}'", name))),
            }
        }
        self.scan_each(selected, cancel).await
    }

    async fn scan_each(
        &self,
        libraries: Vec<Library>,
        cancel: &CancellationToken,
    ) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        for library in libraries {
            if cancel.is_cancelled() {
                break;
            }
            match self.scan_library(&library, cancel).await {
                Ok(library_report) => report.libraries.push(library_report),
                Err(e) => tracing::error!("Failed to scan library '{}': {}", library.name, e),
            }
        }

        Ok(report)
    }

    /// Scan one library and stamp its `last_scanned` when the walk finished.
    ///
    /// Store writes are flushed before returning, cancelled or not. A failed
    /// stamp or flush is recorded in `persist_error`; the counters are kept.
    pub async fn scan_library(
        &self,
        library: &Library,
        cancel: &CancellationToken,
    ) -> Result<LibraryScanReport> {
        tracing::info!("Scanning library '{}' ({})", library.name, library.kind);

        let roots: Vec<PathBuf> = library.enabled_paths().cloned().collect();
        let (tx, rx) = mpsc::channel::<PathBuf>(self.workers * 16);

        let walk_cancel = cancel.clone();
        let walker = tokio::task::spawn_blocking(move || walk_roots(&roots, &tx, &walk_cancel));

        let rx = Arc::new(Mutex::new(rx));
        let workers: Vec<_> = (0..self.workers)
            .map(|_| {
                let rx = Arc::clone(&rx);
                let reconciler = Arc::clone(&self.reconciler);
                let library = library.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { run_worker(rx, reconciler, library, cancel).await })
            })
            .collect();

        let walk = walker
            .await
            .map_err(|e| Error::other(format!("directory walk panicked: {}", e)))?;

        let mut report = LibraryScanReport::new(&library.name);
        for result in futures::future::join_all(workers).await {
            match result {
                Ok(tally) => report.merge(&tally),
                Err(e) => tracing::error!("Scan worker for '{}' failed: {}", library.name, e),
            }
        }
        report.discovered = walk.discovered;
        report.path_errors = walk.path_errors;
        report.cancelled = walk.cancelled || cancel.is_cancelled();

        if report.cancelled {
            tracing::warn!(
                "Scan of library '{}' cancelled, last scanned time unchanged",
                library.name
            );
        } else if let Err(e) = self.mark_scanned(library).await {
            tracing::error!("Failed to stamp library '{}': {}", library.name, e);
            report.persist_error = Some(e.to_string());
        }

        if let Err(e) = self.store.flush().await {
            tracing::error!("Failed to save scan of library '{}': {}", library.name, e);
            if report.persist_error.is_none() {
                report.persist_error = Some(e.to_string());
            }
        }

        tracing::info!(
            "Scanned library '{}': {} files, {} created, {} refreshed, {} skipped, {} failed",
            library.name,
            report.discovered,
            report.created,
            report.refreshed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    async fn mark_scanned(&self, library: &Library) -> Result<()> {
        let Some(mut current) = self.store.find_library(library.id).await? else {
            tracing::warn!("Library '{}' disappeared during scan", library.name);
            return Ok(());
        };
        current.last_scanned = Some(chrono::Utc::now());
        self.store.update_library(&current).await
    }
}

/// Pull paths until the queue closes and tally the outcomes.
async fn run_worker(
    rx: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    reconciler: Arc<Reconciler>,
    library: Library,
    cancel: CancellationToken,
) -> LibraryScanReport {
    let mut tally = LibraryScanReport::new(&library.name);

    loop {
        let next = rx.lock().await.recv().await;
        let Some(path) = next else {
            break;
        };

        match reconciler.reconcile(&library, &path, &cancel).await {
            Ok(Outcome::Created) => tally.created += 1,
            Ok(Outcome::Refreshed) => tally.refreshed += 1,
            Ok(Outcome::Skipped) => tally.skipped += 1,
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Cancelled while processing {}", path.display());
                tally.aborted += 1;
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {}", path.display(), e);
                tally.failed += 1;
            }
        }
    }

    tally
}

/// Opaque configuration of the scanner task.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScanTaskConfig {
    /// Restrict the scan to these libraries.
    libraries: Vec<String>,
}

#[async_trait]
impl TaskExecutor for Scanner {
    async fn execute(&self, cancel: &CancellationToken, config: &str) -> Result<()> {
        let config: ScanTaskConfig = parse_task_config(TASK_TYPE, config)?;

        let report = if config.libraries.is_empty() {
            self.scan_libraries(cancel).await?
        } else {
            self.scan_named(&config.libraries, cancel).await?
        };

        if report.cancelled() || cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(failed) = report.persist_failure() {
            return Err(Error::other(format!(
                "failed to save scan of library '{}': {}",
                failed.library,
                failed.persist_error.as_deref().unwrap_or_default()
            )));
        }

        let total = report.total();
        tracing::info!(
            "Library scan finished: {} libraries, {} files, {} created, {} failed",
            report.libraries.len(),
            total.discovered,
            total.created,
            total.failed
        );
        Ok(())
    }

    fn description(&self) -> &str {
        "Scan library roots and reconcile new files"
    }
}
