//! Interpretation of Upscayl JSON responses.
//!
//! The provider's payloads are loosely typed, so parsing works on
//! [`serde_json::Value`] and tolerates the handful of shapes seen in the
//! wild (`data.taskId` vs `task_id`, numeric ids, `url` vs `path` file
//! entries).

use serde_json::Value;
use upscale_core::task::{ProviderObservation, TaskStatus};

use crate::api::ProviderError;

/// Map a raw provider status string onto our lifecycle.
///
/// Returns `None` for strings we do not recognise; callers keep the
/// current status in that case.
pub fn map_status(raw: &str) -> Option<TaskStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" | "waiting" | "created" | "starting" => Some(TaskStatus::Pending),
        "processing" | "running" | "in_progress" | "in-progress" | "started" | "upscaling" => {
            Some(TaskStatus::Running)
        }
        "completed" | "complete" | "done" | "success" | "succeeded" | "finished" => {
            Some(TaskStatus::Completed)
        }
        "failed" | "error" | "cancelled" | "canceled" | "expired" => Some(TaskStatus::Failed),
        _ => None,
    }
}

/// Extract the provider task id from a `start-task` response.
pub fn parse_start_response(body: &Value) -> Result<String, ProviderError> {
    const CANDIDATES: &[&str] = &[
        "/data/taskId",
        "/data/task_id",
        "/data/id",
        "/taskId",
        "/task_id",
    ];

    CANDIDATES
        .iter()
        .filter_map(|ptr| body.pointer(ptr))
        .find_map(id_string)
        .ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "start-task response carries no task id: {}",
                truncate(&body.to_string(), 256)
            ))
        })
}

/// Turn a `get-task-status` response into a [`ProviderObservation`].
///
/// `file_base_url` is prefixed to file entries that only carry a `path`.
pub fn parse_status_response(body: Value, file_base_url: &str) -> ProviderObservation {
    let data = body.get("data").unwrap_or(&body);

    let raw_status = data
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = raw_status.as_deref().and_then(map_status);

    let image_urls = data
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|file| file_url(file, file_base_url))
                .collect()
        })
        .unwrap_or_default();

    let error = error_detail(data).or_else(|| error_detail(&body));

    ProviderObservation {
        status,
        raw_status,
        image_urls,
        error,
        payload: Some(body),
    }
}

/// Pull a human-readable error out of a provider body, if it has one.
pub fn error_detail(value: &Value) -> Option<String> {
    let err = value.get("error").or_else(|| value.get("message"))?;
    match err {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Cut a string to at most `max` characters, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---- private helpers ----

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn file_url(file: &Value, base_url: &str) -> Option<String> {
    let obj = file.as_object()?;
    if let Some(url) = obj.get("url").and_then(Value::as_str) {
        return Some(url.to_string());
    }
    let path = obj.get("path").and_then(Value::as_str)?;
    Some(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
