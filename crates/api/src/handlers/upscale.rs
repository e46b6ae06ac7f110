//! Handlers for the `/upscale` resource.
//!
//! Submissions are `multipart/form-data`. Every endpoint passes through the
//! [`ServiceKey`] guard, which is a no-op unless `SERVICE_API_KEY` is set.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use upscale_core::error::CoreError;
use upscale_core::request::{parse_flag, parse_scale, parse_urls, UploadedImage, UpscaleRequest};
use upscale_core::task::TaskStatus;
use upscale_core::types::TaskId;

use crate::error::AppResult;
use crate::middleware::api_key::ServiceKey;
use crate::state::AppState;

/// Content type assumed for file parts that do not declare one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Body of a successful async submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: &'static str,
    /// Provider acceptance payload, passed through untouched.
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Form parsing
// ---------------------------------------------------------------------------

/// Collect a multipart upscale form into an [`UpscaleRequest`].
///
/// Recognised fields: `files` (or `file`, repeatable), `model`, `scale`,
/// `saveImageAs`, `enhanceFace`, `urls`. Unknown fields are ignored.
/// Range checks happen later, in [`UpscaleRequest::validate`].
pub async fn read_upscale_form(mut multipart: Multipart) -> AppResult<UpscaleRequest> {
    let mut request = UpscaleRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await?;
                request.images.push(UploadedImage {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "model" => request.options.model = field.text().await?,
            "scale" => request.options.scale = parse_scale(&field.text().await?)?,
            "saveImageAs" | "save_image_as" => request.options.save_image_as = field.text().await?,
            "enhanceFace" | "enhance_face" => {
                request.options.enhance_face = parse_flag("enhanceFace", &field.text().await?)?;
            }
            "urls" => request.options.urls = parse_urls(&field.text().await?)?,
            _ => {} // ignore unknown fields
        }
    }

    Ok(request)
}

fn parse_task_id(raw: &str) -> Result<TaskId, CoreError> {
    raw.parse::<TaskId>()
        .map_err(|_| CoreError::Validation(format!("Invalid task id '{raw}'")))
}

// ---------------------------------------------------------------------------
// Submit (async)
// ---------------------------------------------------------------------------

/// POST /upscale/images
///
/// Validate the upload, hand it to Upscayl, and return `202 Accepted` with
/// the new `task_id` as soon as the provider accepts the work.
pub async fn submit_images(
    _key: ServiceKey,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let request = read_upscale_form(multipart).await?;
    let submission = state.task_manager.submit_async(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: submission.task.id,
            status: submission.task.status,
            message: "Task accepted by provider",
            data: submission.provider_payload,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /upscale/task/{task_id}
///
/// Return the task, refreshed from the provider unless already terminal.
/// Completed tasks carry `image_urls`; failed ones carry `error`.
pub async fn get_task(
    _key: ServiceKey,
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task_id = parse_task_id(&task_id)?;
    let task = state.task_manager.get_status(task_id).await?;
    Ok(Json(task))
}

// ---------------------------------------------------------------------------
// Submit (sync)
// ---------------------------------------------------------------------------

/// POST /upscale/images-sync
///
/// Validate the upload, hand it to Upscayl, and hold the request open until
/// the task completes. Returns the completed task, `502` if the provider
/// fails it, or `504` once the sync wait budget is spent.
pub async fn submit_images_sync(
    _key: ServiceKey,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let request = read_upscale_form(multipart).await?;
    let task = state.task_manager.submit_sync(request).await?;
    Ok(Json(task))
}
