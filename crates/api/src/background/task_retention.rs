//! Periodic eviction of finished and abandoned tasks.
//!
//! Terminal tasks stay pollable for `terminal_ttl` after completing; any
//! task older than `max_age` is dropped whatever its status. Runs on a
//! fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use upscale_core::store::{EvictionStats, TaskStore};
use upscale_core::types::Timestamp;

use crate::config::RetentionConfig;

/// Run the task retention loop until `cancel` is triggered.
pub async fn run(store: Arc<TaskStore>, config: RetentionConfig, cancel: CancellationToken) {
    tracing::info!(
        terminal_ttl_secs = config.terminal_ttl.as_secs(),
        max_age_secs = config.max_age.as_secs(),
        interval_secs = config.sweep_interval.as_secs(),
        "Task retention job started"
    );

    let mut interval = tokio::time::interval(config.sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task retention job stopping");
                break;
            }
            _ = interval.tick() => {
                let stats = sweep_once(&store, &config, Utc::now()).await;
                if stats.total() > 0 {
                    let remaining = store.len().await;
                    tracing::info!(
                        expired = stats.expired,
                        stale = stats.stale,
                        remaining,
                        "Task retention: evicted tasks"
                    );
                } else {
                    tracing::debug!("Task retention: nothing to evict");
                }
            }
        }
    }
}

/// Evict everything that is past its retention window as of `now`.
pub async fn sweep_once(store: &TaskStore, config: &RetentionConfig, now: Timestamp) -> EvictionStats {
    store
        .evict_expired(cutoff(now, config.terminal_ttl), cutoff(now, config.max_age))
        .await
}

/// `now - age`, saturating at the earliest representable time.
fn cutoff(now: Timestamp, age: Duration) -> Timestamp {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
