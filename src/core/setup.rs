//! Startup registration of libraries and scheduled tasks from configuration.

use std::path::PathBuf;

use crate::core::{cleanup, scanner};
use crate::models::config::Config;
use crate::models::library::{Library, LibraryKind, LibraryPath};
use crate::models::task::ScheduledTask;
use crate::store::{LibraryRepository, TaskRepository};
use crate::Result;

/// Name of the library built from `scanner.movie_dirs`.
pub const MOVIES_LIBRARY: &str = "Movies";
/// Name of the library built from `scanner.series_dirs`.
pub const SERIES_LIBRARY: &str = "Series";
/// Name of the scanner task row.
pub const SCAN_TASK: &str = "library-scan";
/// Name of the cleanup task row.
pub const CLEANUP_TASK: &str = "library-cleanup";

/// Create or update the configured libraries.
///
/// Libraries are created on first sight. Existing ones gain newly configured
/// roots and follow the configured auto-scan settings; roots removed from the
/// configuration are kept.
pub async fn ensure_libraries(
    store: &dyn LibraryRepository,
    config: &Config,
) -> Result<Vec<Library>> {
    let scanner = &config.scanner;
    let wanted = [
        (MOVIES_LIBRARY, LibraryKind::Movie, &scanner.movie_dirs),
        (SERIES_LIBRARY, LibraryKind::Series, &scanner.series_dirs),
    ];

    let mut libraries = Vec::new();
    for (name, kind, dirs) in wanted {
        match store.find_library_by_name(name).await? {
            Some(mut library) => {
                let mut changed = false;
                for dir in dirs {
                    if !library.paths.iter().any(|p| &p.path == dir) {
                        tracing::info!("Adding {} to library '{}'", dir.display(), name);
                        library.paths.push(LibraryPath {
                            path: dir.clone(),
                            enabled: true,
                        });
                        changed = true;
                    }
                }
                if library.auto_scan != scanner.auto_scan
                    || library.scan_interval != scanner.scan_interval
                {
                    library.auto_scan = scanner.auto_scan;
                    library.scan_interval = scanner.scan_interval.clone();
                    changed = true;
                }
                if changed {
                    store.update_library(&library).await?;
                }
                libraries.push(library);
            }
            None if dirs.is_empty() => {}
            None => {
                let mut library = dirs
                    .iter()
                    .fold(Library::new(name, kind), |library, dir: &PathBuf| {
                        library.with_path(dir.clone())
                    });
                library.auto_scan = scanner.auto_scan;
                library.scan_interval = scanner.scan_interval.clone();
                let library = store.create_library(library).await?;
                tracing::info!("Created library '{}' with {} roots", name, dirs.len());
                libraries.push(library);
            }
        }
    }

    Ok(libraries)
}

/// Create or update the scanner and cleanup task rows.
///
/// Interval and enabled flag follow the configuration; run history is kept.
pub async fn ensure_default_tasks(
    store: &dyn TaskRepository,
    config: &Config,
) -> Result<Vec<ScheduledTask>> {
    let wanted = [
        (
            SCAN_TASK,
            scanner::TASK_TYPE,
            config.scanner.scan_interval.as_str(),
            config.scanner.auto_scan,
            "Scan configured libraries for new media",
        ),
        (
            CLEANUP_TASK,
            cleanup::TASK_TYPE,
            config.cleanup.clean_interval.as_str(),
            config.cleanup.enabled,
            "Remove library items whose files are gone",
        ),
    ];

    let mut tasks = Vec::new();
    for (name, task_type, interval, enabled, description) in wanted {
        match store.find_task_by_name(name).await? {
            Some(mut task) => {
                if task.interval != interval || task.enabled != enabled {
                    task.interval = interval.to_string();
                    task.enabled = enabled;
                    store.update_task(&task).await?;
                }
                tasks.push(task);
            }
            None => {
                let mut task = ScheduledTask::new(name, task_type, interval);
                task.enabled = enabled;
                task.description = description.to_string();
                let task = store.create_task(task).await?;
                tracing::info!("Registered task '{}' ({})", name, task_type);
                tasks.push(task);
            }
        }
    }

    Ok(tasks)
}
