//! Task correlation between clients and the upscaling provider.
//!
//! [`TaskManager`] validates requests, hands them to an
//! [`UpscaleProvider`], and tracks each accepted provider task under a
//! server-generated id in the [`TaskStore`]. Status is refreshed from the
//! provider on demand: async callers poll [`TaskManager::get_status`], sync
//! callers block in [`TaskManager::submit_sync`] until the task is terminal
//! or the wait budget runs out.
//!
//! No call to the provider is retried.

use std::sync::Arc;
use std::time::Duration;

use upscale_core::error::CoreError;
use upscale_core::request::UpscaleRequest;
use upscale_core::store::TaskStore;
use upscale_core::task::{Task, TaskMode, TaskStatus};
use upscale_core::types::TaskId;

use crate::api::{ProviderError, StartedTask};
use crate::provider::UpscaleProvider;

/// Default wait budget for synchronous submissions.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);
/// Default provider poll cadence on the sync path.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tunables for the correlation layer.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on the whole `submit_sync` call (start plus polling).
    pub sync_timeout: Duration,
    /// Delay between provider status polls while a sync caller waits.
    pub poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of an async submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Snapshot of the freshly stored `pending` task.
    pub task: Task,
    /// Raw provider acceptance payload.
    pub provider_payload: serde_json::Value,
}

/// Correlates client-facing task ids with provider task handles.
///
/// Created once at startup. Wrap in `Arc` to share with request handlers.
pub struct TaskManager {
    provider: Arc<dyn UpscaleProvider>,
    store: Arc<TaskStore>,
    config: ManagerConfig,
}

impl TaskManager {
    pub fn new(provider: Arc<dyn UpscaleProvider>, config: ManagerConfig) -> Self {
        Self::with_store(provider, Arc::new(TaskStore::new()), config)
    }

    pub fn with_store(
        provider: Arc<dyn UpscaleProvider>,
        store: Arc<TaskStore>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// The task table, shared with the retention job.
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Validate, hand the request to the provider, and record a `pending`
    /// task. Returns as soon as the provider accepts the work.
    pub async fn submit_async(&self, request: UpscaleRequest) -> Result<Submission, CoreError> {
        let request = request.validate()?;
        let started = self.start(&request).await?;

        let task = Task::new(TaskMode::Async, started.provider_task_id.clone());
        let mut snapshot = task.clone();
        snapshot.id = self.store.insert(task).await;

        tracing::info!(
            task_id = %snapshot.id,
            provider_task_id = %snapshot.provider_task_id,
            files = request.images.len(),
            urls = request.options.urls.len(),
            "Upscale task submitted",
        );

        Ok(Submission {
            task: snapshot,
            provider_payload: started.payload,
        })
    }

    /// Look up a task, refreshing it from the provider unless it is already
    /// terminal.
    ///
    /// The per-task lock is held across the provider call, so concurrent
    /// polls of the same task are serialized.
    pub async fn get_status(&self, id: TaskId) -> Result<Task, CoreError> {
        let handle = self.store.get(id).await.ok_or_else(|| not_found(id))?;
        let mut task = handle.lock().await;
        if !task.is_terminal() {
            self.refresh(&mut task).await?;
        }
        Ok(task.clone())
    }

    /// Validate, hand the request to the provider, and wait for the task to
    /// finish.
    ///
    /// The task is stored in `sync` mode so it stays pollable if the caller
    /// gives up. Fails with [`CoreError::UpstreamTimeout`] once
    /// `sync_timeout` elapses and with [`CoreError::Upstream`] when the
    /// provider errors or reports the task as failed.
    pub async fn submit_sync(&self, request: UpscaleRequest) -> Result<Task, CoreError> {
        let request = request.validate()?;
        let budget = self.config.sync_timeout;

        match tokio::time::timeout(budget, self.run_sync(&request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = budget.as_millis() as u64,
                    "Synchronous upscale exceeded its wait budget",
                );
                Err(CoreError::UpstreamTimeout {
                    timeout_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    // ---- private helpers ----

    async fn run_sync(&self, request: &UpscaleRequest) -> Result<Task, CoreError> {
        let started = self.start(request).await?;
        let (id, handle) = self
            .store
            .insert_with_handle(Task::new(TaskMode::Sync, started.provider_task_id))
            .await;

        tracing::info!(task_id = %id, "Waiting for synchronous upscale");

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let mut task = handle.lock().await;
            self.refresh(&mut task).await?;

            match task.status {
                TaskStatus::Completed => {
                    tracing::info!(task_id = %id, images = task.image_urls.len(), "Synchronous upscale completed");
                    return Ok(task.clone());
                }
                TaskStatus::Failed => {
                    let detail = task
                        .error
                        .clone()
                        .unwrap_or_else(|| "Provider reported the task as failed".to_string());
                    return Err(CoreError::Upstream(detail));
                }
                TaskStatus::Pending | TaskStatus::Running => {}
            }
        }
    }

    async fn start(&self, request: &UpscaleRequest) -> Result<StartedTask, CoreError> {
        self.provider
            .start_task(request)
            .await
            .map_err(|e| upstream_error("start task", &e))
    }

    /// Pull one observation from the provider and fold it into `task`.
    async fn refresh(&self, task: &mut Task) -> Result<(), CoreError> {
        let observation = self
            .provider
            .task_status(&task.provider_task_id)
            .await
            .map_err(|e| upstream_error("fetch task status", &e))?;

        if observation.status.is_none() {
            tracing::warn!(
                task_id = %task.id,
                raw_status = ?observation.raw_status,
                "Unrecognised provider status, keeping current status",
            );
        }

        let previous = task.status;
        if task.apply_observation(observation) {
            tracing::info!(
                task_id = %task.id,
                from = %previous,
                to = %task.status,
                "Task status advanced",
            );
        }
        Ok(())
    }
}

fn not_found(id: TaskId) -> CoreError {
    CoreError::NotFound {
        entity: "Task",
        id: id.to_string(),
    }
}

fn upstream_error(action: &str, err: &ProviderError) -> CoreError {
    tracing::warn!(action, timeout = err.is_timeout(), error = %err, "Upscayl call failed");
    CoreError::Upstream(format!("Failed to {action}: {err}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
