//! Recurring task scheduler.
//!
//! Persisted `ScheduledTask` rows are bound to executors through a
//! `TaskRegistry` built at startup. Each loaded task gets its own loop, so
//! different tasks run concurrently while one task never overlaps itself.
//!
//! A task cycles `idle → running → idle | failed`. The running state is
//! persisted before the executor starts, and the final state with the next
//! run time after it returns. When the running state cannot be saved the
//! firing is skipped and retried one interval later. An executor that panics
//! ends as `failed`.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::task::{ScheduledTask, TaskStatus};
use crate::store::TaskRepository;
use crate::{Error, Result};

/// A unit of scheduled work.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run once with the task's opaque configuration.
    async fn execute(&self, cancel: &CancellationToken, config: &str) -> Result<()>;

    /// Short human-readable description.
    fn description(&self) -> &str;
}

/// Task type → executor lookup, built once and handed to the scheduler.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for `task_type`, replacing any previous one.
    pub fn register(&mut self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        let task_type = task_type.into();
        if self.executors.contains_key(&task_type) {
            tracing::warn!("Replacing executor for task type '{}'", task_type);
        }
        self.executors.insert(task_type, executor);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_type).cloned()
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Parse an interval such as "24h", "90m" or "1h 30m". Zero is rejected.
pub fn parse_interval(interval: &str) -> Result<Duration> {
    let parsed =
        humantime::parse_duration(interval.trim()).map_err(|e| Error::InvalidInterval {
            interval: interval.to_string(),
            reason: e.to_string(),
        })?;

    if parsed.is_zero() {
        return Err(Error::InvalidInterval {
            interval: interval.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}

/// Decode an executor's JSON configuration. Blank means defaults.
pub fn parse_task_config<T: DeserializeOwned + Default>(task_type: &str, config: &str) -> Result<T> {
    if config.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(config).map_err(|e| Error::InvalidTaskConfig {
        task: task_type.to_string(),
        reason: e.to_string(),
    })
}

/// What `load_tasks` did with each persisted task.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Tasks now scheduled.
    pub scheduled: Vec<String>,
    /// Tasks skipped because they are disabled.
    pub disabled: Vec<String>,
    /// Tasks skipped because no executor handles their type.
    pub unknown_type: Vec<String>,
    /// Tasks skipped because their interval does not parse.
    pub invalid: Vec<(String, Error)>,
}

/// A loaded task bound to its executor.
struct Job {
    task: Mutex<ScheduledTask>,
    executor: Arc<dyn TaskExecutor>,
    interval: Duration,
}

/// Runs registered executors on their persisted intervals.
pub struct Scheduler {
    registry: TaskRegistry,
    tasks: Arc<dyn TaskRepository>,
    jobs: HashMap<String, Arc<Job>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(registry: TaskRegistry, tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            registry,
            tasks,
            jobs: HashMap::new(),
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Load persisted tasks and bind each enabled one to its executor.
    ///
    /// Only a failure to read the task list is an error. Unknown types and
    /// malformed intervals are reported in the summary and skipped.
    pub async fn load_tasks(&mut self) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        for mut task in self.tasks.list_tasks().await? {
            if !task.enabled {
                tracing::debug!("Task '{}' is disabled", task.name);
                summary.disabled.push(task.name);
                continue;
            }

            let Some(executor) = self.registry.get(&task.task_type) else {
                tracing::warn!(
                    "No executor registered for task '{}' of type '{}', skipping",
                    task.name,
                    task.task_type
                );
                summary.unknown_type.push(task.name);
                continue;
            };

            let interval = match parse_interval(&task.interval) {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::error!("Cannot schedule task '{}': {}", task.name, e);
                    summary.invalid.push((task.name, e));
                    continue;
                }
            };

            if task.status == TaskStatus::Running {
                tracing::warn!(
                    "Task '{}' was left running by a previous process",
                    task.name
                );
                task.status = TaskStatus::Idle;
            }

            tracing::info!(
                "Scheduled task '{}' ({}) every {}",
                task.name,
                task.task_type,
                humantime::format_duration(interval)
            );
            summary.scheduled.push(task.name.clone());
            self.jobs.insert(
                task.name.clone(),
                Arc::new(Job {
                    task: Mutex::new(task),
                    executor,
                    interval,
                }),
            );
        }

        Ok(summary)
    }

    /// Names of the loaded tasks.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start one loop per loaded task. Cancelling `parent` stops them all.
    pub fn start(&mut self, parent: &CancellationToken) {
        if !self.handles.is_empty() {
            tracing::warn!("Scheduler already started");
            return;
        }

        self.shutdown = parent.child_token();
        for job in self.jobs.values() {
            let job = Arc::clone(job);
            let tasks = Arc::clone(&self.tasks);
            let cancel = self.shutdown.clone();
            self.handles
                .push(tokio::spawn(async move { run_loop(job, tasks, cancel).await }));
        }
        tracing::info!("Scheduler started with {} tasks", self.jobs.len());
    }

    /// Run a loaded task now, waiting for a run already in progress.
    pub async fn trigger(&self, name: &str) -> Result<TaskStatus> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;
        run_once(job, self.tasks.as_ref(), &self.shutdown).await;
        Ok(job.task.lock().await.status)
    }

    /// Stop all loops, giving running executors `grace` to wind down.
    pub async fn shutdown(&mut self, grace: Duration) {
        tracing::info!("Shutting down scheduler...");
        self.shutdown.cancel();

        for handle in self.handles.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!("Task did not stop within {:?}, aborting", grace);
                abort.abort();
            }
        }
        tracing::info!("Scheduler shutdown complete");
    }
}

/// Delay before the first run: until `next_run` (none if it is due), or one
/// interval for a task that was never scheduled.
async fn initial_delay(job: &Job) -> Duration {
    let task = job.task.lock().await;
    match task.next_run {
        Some(next) => (next - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => job.interval,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn run_loop(job: Arc<Job>, tasks: Arc<dyn TaskRepository>, cancel: CancellationToken) {
    let mut delay = initial_delay(&job).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = run_once(&job, tasks.as_ref(), &cancel).await;
    }
}

/// Execute a task once and record its state. Returns the delay until the
/// next run.
async fn run_once(job: &Job, tasks: &dyn TaskRepository, cancel: &CancellationToken) -> Duration {
    let mut task = job.task.lock().await;

    let previous = task.clone();
    task.status = TaskStatus::Running;
    task.last_run = Some(Utc::now());
    if let Err(e) = tasks.update_task(&task).await {
        tracing::error!(
            "Failed to mark task '{}' running, skipping this run: {}",
            task.name,
            e
        );
        *task = previous;
        return job.interval;
    }

    tracing::info!("Running task '{}' ({})", task.name, task.task_type);
    let started = std::time::Instant::now();
    let result = AssertUnwindSafe(job.executor.execute(cancel, &task.config))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(Error::other(format!(
                "executor panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

    task.status = match &result {
        Ok(()) => {
            tracing::info!(
                "Task '{}' completed in {:.1}s",
                task.name,
                started.elapsed().as_secs_f64()
            );
            TaskStatus::Idle
        }
        Err(e) if e.is_cancelled() => {
            tracing::warn!("Task '{}' cancelled", task.name);
            TaskStatus::Idle
        }
        Err(e) => {
            tracing::error!("Task '{}' failed: {}", task.name, e);
            TaskStatus::Failed
        }
    };

    let interval = match parse_interval(&task.interval) {
        Ok(interval) => interval,
        Err(e) => {
            tracing::error!("Task '{}': {}, keeping previous interval", task.name, e);
            job.interval
        }
    };
    task.next_run = chrono::Duration::from_std(interval)
        .ok()
        .and_then(|step| Utc::now().checked_add_signed(step));

    if let Err(e) = tasks.update_task(&task).await {
        tracing::error!("Failed to save state of task '{}': {}", task.name, e);
    }

    interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_interval("1h 30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_interval(" 90s ").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_interval_rejects_bad_input() {
        assert!(matches!(
            parse_interval("soon"),
            Err(Error::InvalidInterval { .. })
        ));
        assert!(matches!(
            parse_interval("0s"),
            Err(Error::InvalidInterval { .. })
        ));
        assert!(parse_interval("").is_err());
    }

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    #[serde(default)]
    struct Options {
        libraries: Vec<String>,
    }

    #[test]
    fn test_parse_task_config() {
        let blank: Options = parse_task_config("scanner", "  ").unwrap();
        assert_eq!(blank, Options::default());

        let options: Options = parse_task_config("scanner", r#"{"libraries":["Movies"]}"#).unwrap();
        assert_eq!(options.libraries, vec!["Movies".to_string()]);

        let err = parse_task_config::<Options>("scanner", "{").unwrap_err();
        assert!(matches!(err, Error::InvalidTaskConfig { .. }));
    }
}
