//! Upscale task model and its monotonic status machine.
//!
//! A task moves `pending -> running -> {completed, failed}`. `pending` may
//! jump straight to a terminal state when the provider finishes between two
//! polls. Nothing ever leaves a terminal state, and regressed observations
//! from the provider are ignored rather than applied.

use serde::Serialize;

use crate::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an upscale task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the task has finished (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Position in the lifecycle; terminal states share the highest rank.
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    ///
    /// Same-state "transitions" are not transitions and return `false`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller submitted the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Caller received a task id and polls for the result.
    Async,
    /// Caller blocked until the provider finished.
    Sync,
}

// ---------------------------------------------------------------------------
// Provider observation
// ---------------------------------------------------------------------------

/// One snapshot of the provider's view of a task.
#[derive(Debug, Clone, Default)]
pub struct ProviderObservation {
    /// Mapped status, or `None` when the provider reported something we
    /// do not recognise.
    pub status: Option<TaskStatus>,
    /// Raw status string as reported by the provider.
    pub raw_status: Option<String>,
    /// Output image URLs, in provider order.
    pub image_urls: Vec<String>,
    /// Provider-supplied failure detail, if any.
    pub error: Option<String>,
    /// Raw provider payload.
    pub payload: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of upscaling work tracked under a server-generated identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: TaskId,
    pub mode: TaskMode,
    pub status: TaskStatus,
    /// Handle assigned by the provider when it accepted the work.
    pub provider_task_id: String,
    /// Last raw status string seen from the provider.
    pub provider_status: Option<String>,
    pub image_urls: Vec<String>,
    /// Raw provider payload captured when the task completed.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Create a new `pending` task correlated with a provider handle.
    ///
    /// The id is a placeholder until the task is inserted into a
    /// [`TaskStore`](crate::store::TaskStore), which assigns the real one.
    pub fn new(mode: TaskMode, provider_task_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::nil(),
            mode,
            status: TaskStatus::Pending,
            provider_task_id: provider_task_id.into(),
            provider_status: None,
            image_urls: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a provider observation into the task.
    ///
    /// Returns `true` if the status advanced. Observations arriving after
    /// the task is terminal are dropped entirely; a regressed or unknown
    /// status leaves the status untouched but still records the raw string.
    pub fn apply_observation(&mut self, obs: ProviderObservation) -> bool {
        if self.is_terminal() {
            return false;
        }

        let now = chrono::Utc::now();
        self.updated_at = now;
        if obs.raw_status.is_some() {
            self.provider_status = obs.raw_status;
        }

        let next = match obs.status {
            Some(next) if self.status.can_transition_to(next) => next,
            _ => return false,
        };

        self.status = next;
        match next {
            TaskStatus::Completed => {
                self.image_urls = obs.image_urls;
                self.result = obs.payload;
                self.completed_at = Some(now);
            }
            TaskStatus::Failed => {
                self.error = Some(
                    obs.error
                        .unwrap_or_else(|| "Provider reported the task as failed".to_string()),
                );
                self.result = obs.payload;
                self.completed_at = Some(now);
            }
            TaskStatus::Pending | TaskStatus::Running => {
                if !obs.image_urls.is_empty() {
                    self.image_urls = obs.image_urls;
                }
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
