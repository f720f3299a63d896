//! Application wiring: builds the store, services and executors from `Config`.

use std::sync::Arc;

use crate::core::cleanup::{self, Cleanup};
use crate::core::reconciler::Reconciler;
use crate::core::scanner::{self, Scanner};
use crate::core::scheduler::{Scheduler, TaskRegistry};
use crate::core::setup;
use crate::models::config::Config;
use crate::services::ffprobe::{Ffprobe, MediaExtractor};
use crate::services::tmdb::{MetadataCatalog, TmdbClient};
use crate::store::{MemoryStore, Persist, Store};
use crate::{Result, ResultExt};

/// Long-lived services shared by the CLI commands.
pub struct App {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub ffprobe: Arc<Ffprobe>,
    pub scanner: Arc<Scanner>,
    pub cleanup: Arc<Cleanup>,
}

impl App {
    /// Open the store snapshot under `data_dir` and build the services.
    pub async fn open(config: Config) -> Result<Self> {
        let path = config.store_path();
        let store = MemoryStore::open(&path)
            .await
            .with_context(|| format!("open store {}", path.display()))?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build the services on top of an existing store.
    pub fn with_store(config: Config, store: Arc<MemoryStore>) -> Self {
        let ffprobe = Arc::new(Ffprobe::new(&config.ffprobe.path));

        let catalog: Option<Arc<dyn MetadataCatalog>> = match TmdbClient::new(config.tmdb.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("{}; titles will come from filenames", e);
                None
            }
        };

        let shared: Arc<dyn Store> = store.clone();
        let extractor: Arc<dyn MediaExtractor> = ffprobe.clone();
        let reconciler = Arc::new(Reconciler::new(shared.clone(), extractor, catalog));
        let scanner = Arc::new(Scanner::new(
            shared.clone(),
            reconciler,
            config.scanner.workers,
        ));
        let cleanup = Arc::new(Cleanup::new(shared, config.cleanup.clone()));

        Self {
            config,
            store,
            ffprobe,
            scanner,
            cleanup,
        }
    }

    /// Register configured libraries and the default task rows.
    pub async fn bootstrap(&self) -> Result<()> {
        if self.config.scanner.watch_dirs {
            tracing::warn!("watch_dirs is not supported; libraries are only scanned on schedule");
        }
        setup::ensure_libraries(self.store.as_ref(), &self.config)
            .await
            .context("register libraries")?;
        setup::ensure_default_tasks(self.store.as_ref(), &self.config)
            .await
            .context("register tasks")?;
        self.store.flush().await.context("save libraries")?;
        Ok(())
    }

    /// Executors for every known task type.
    pub fn registry(&self) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register(scanner::TASK_TYPE, self.scanner.clone());
        registry.register(cleanup::TASK_TYPE, self.cleanup.clone());
        registry
    }

    /// A scheduler over the persisted tasks, not yet loaded.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.registry(), self.store.clone())
    }
}
