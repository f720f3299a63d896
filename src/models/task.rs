//! Persisted scheduled task definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::library::EntityId;

/// Run state of a scheduled task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Idle => write!(f, "idle"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A recurring unit of work. `task_type` selects the registered executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: EntityId,
    /// Unique name.
    pub name: String,
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    /// Duration string, e.g. "24h" or "1h 30m".
    pub interval: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    /// Opaque executor configuration.
    #[serde(default)]
    pub config: String,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            task_type: task_type.into(),
            description: String::new(),
            enabled: true,
            interval: interval.into(),
            last_run: None,
            next_run: None,
            status: TaskStatus::Idle,
            config: String::new(),
        }
    }
}
