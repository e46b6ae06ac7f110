//! In-memory task table.
//!
//! The outer map is guarded by an `RwLock` and each task sits behind its
//! own `Mutex`. Callers clone the per-task handle out of the map and drop
//! the map lock before doing anything slow, so work on one task never
//! blocks work on another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::task::Task;
use crate::types::{TaskId, Timestamp};

/// Shared handle to a single task record.
pub type TaskHandle = Arc<Mutex<Task>>;

/// Owned, lifecycle-scoped task table.
///
/// Designed to be wrapped in `Arc` and shared across request handlers and
/// the retention job.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, TaskHandle>>,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Terminal tasks dropped after their retention window.
    pub expired: usize,
    /// Tasks of any status dropped for exceeding the maximum age.
    pub stale: usize,
}

impl EvictionStats {
    pub fn total(&self) -> usize {
        self.expired + self.stale
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task under a freshly generated id and return that id.
    ///
    /// Any id already on the task is overwritten. A new id is drawn until
    /// it does not collide with a live entry.
    pub async fn insert(&self, task: Task) -> TaskId {
        self.insert_with_handle(task).await.0
    }

    /// Like [`insert`](Self::insert), but also hands back the task handle so
    /// the caller can keep working on it without a second lookup.
    pub async fn insert_with_handle(&self, mut task: Task) -> (TaskId, TaskHandle) {
        let mut tasks = self.tasks.write().await;
        let mut id = TaskId::new_v4();
        while tasks.contains_key(&id) {
            id = TaskId::new_v4();
        }
        task.id = id;
        let handle = Arc::new(Mutex::new(task));
        tasks.insert(id, Arc::clone(&handle));
        (id, handle)
    }

    /// Shared handle to a task, if it exists.
    pub async fn get(&self, id: TaskId) -> Option<TaskHandle> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Point-in-time copy of a task.
    pub async fn snapshot(&self, id: TaskId) -> Option<Task> {
        let handle = self.get(id).await?;
        let task = handle.lock().await;
        Some(task.clone())
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Drop terminal tasks completed before `terminal_cutoff` and any task
    /// created before `stale_cutoff`.
    ///
    /// Tasks whose lock is currently held (a refresh is in flight) are
    /// skipped and picked up by a later sweep.
    pub async fn evict_expired(
        &self,
        terminal_cutoff: Timestamp,
        stale_cutoff: Timestamp,
    ) -> EvictionStats {
        let mut expired = Vec::new();
        let mut stale = Vec::new();

        {
            let tasks = self.tasks.read().await;
            for (id, handle) in tasks.iter() {
                let Ok(task) = handle.try_lock() else {
                    continue;
                };
                if task.created_at < stale_cutoff {
                    stale.push(*id);
                } else if task.completed_at.is_some_and(|at| at < terminal_cutoff) {
                    expired.push(*id);
                }
            }
        }

        if expired.is_empty() && stale.is_empty() {
            return EvictionStats::default();
        }

        let mut tasks = self.tasks.write().await;
        let mut stats = EvictionStats::default();
        for id in &expired {
            if tasks.remove(id).is_some() {
                stats.expired += 1;
            }
        }
        for id in &stale {
            if tasks.remove(id).is_some() {
                stats.stale += 1;
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
