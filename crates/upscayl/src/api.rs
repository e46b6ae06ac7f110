//! REST API client for the Upscayl HTTP endpoints.
//!
//! Wraps task submission (`/start-task`, multipart) and status lookup
//! (`/get-task-status`, JSON) using [`reqwest`]. Every call carries the
//! `X-API-Key` header.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use upscale_core::request::UpscaleRequest;
use upscale_core::task::ProviderObservation;

use crate::status::{parse_start_response, parse_status_response, truncate};

/// Header carrying the provider credential.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Longest slice of a provider error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Connection settings for the Upscayl API.
#[derive(Debug, Clone)]
pub struct UpscaylConfig {
    /// Base HTTP URL, e.g. `https://api.upscayl.org`. No trailing slash.
    pub api_url: String,
    pub api_key: String,
    /// CDN base used for file entries that only carry a `path`.
    pub file_base_url: String,
    /// Timeout for `start-task` (uploads can be large).
    pub submit_timeout: Duration,
    /// Timeout for `get-task-status`.
    pub status_timeout: Duration,
}

/// HTTP client for the Upscayl API.
pub struct UpscaylApi {
    client: reqwest::Client,
    config: UpscaylConfig,
}

/// Provider acceptance of a new task.
#[derive(Debug, Clone)]
pub struct StartedTask {
    /// Provider-assigned handle used for status lookups.
    pub provider_task_id: String,
    /// Raw acceptance payload.
    pub payload: Value,
}

/// Errors from the Upscayl REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upscayl returned a non-2xx status code.
    #[error("Upscayl API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response was 2xx but not in a shape we understand.
    #[error("Invalid Upscayl response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the failure was a client-side request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Request(e) if e.is_timeout())
    }
}

impl UpscaylApi {
    /// Create a new API client.
    pub fn new(config: UpscaylConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, mut config: UpscaylConfig) -> Self {
        config.api_url = config.api_url.trim_end_matches('/').to_string();
        Self { client, config }
    }

    /// Submit images and/or URLs for upscaling.
    ///
    /// Sends a `POST /start-task` multipart form. Files go in as
    /// `0.file`, `1.file`, ... and options as text fields. Returns once the
    /// provider has accepted the task, not when it finishes.
    pub async fn start_task(&self, request: &UpscaleRequest) -> Result<StartedTask, ProviderError> {
        let form = build_start_form(request)?;

        let response = self
            .client
            .post(format!("{}/start-task", self.config.api_url))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.submit_timeout)
            .multipart(form)
            .send()
            .await?;

        let payload: Value = Self::parse_response(response).await?;
        let provider_task_id = parse_start_response(&payload)?;

        Ok(StartedTask {
            provider_task_id,
            payload,
        })
    }

    /// Fetch the provider's current view of a task.
    ///
    /// Sends a `POST /get-task-status` with `{"data": {"taskId": ...}}`.
    pub async fn get_task_status(
        &self,
        provider_task_id: &str,
    ) -> Result<ProviderObservation, ProviderError> {
        let body = serde_json::json!({
            "data": { "taskId": provider_task_id },
        });

        let response = self
            .client
            .post(format!("{}/get-task-status", self.config.api_url))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.status_timeout)
            .json(&body)
            .send()
            .await?;

        let payload: Value = Self::parse_response(response).await?;
        Ok(parse_status_response(payload, &self.config.file_base_url))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProviderError::Api`]
    /// containing the status and (truncated) body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(status = status.as_u16(), body = %body, "Upscayl returned an error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// A 2xx body that is not valid JSON is an
    /// [`ProviderError::InvalidResponse`], not a transport failure.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ProviderError::InvalidResponse(format!(
                "{e}: {}",
                truncate(&String::from_utf8_lossy(&bytes), MAX_ERROR_BODY_CHARS)
            ))
        })
    }
}

/// Build the `start-task` multipart form.
fn build_start_form(request: &UpscaleRequest) -> Result<Form, ProviderError> {
    let opts = &request.options;
    let mut form = Form::new()
        .text("model", opts.model.clone())
        .text("scale", opts.scale.to_string())
        .text("saveImageAs", opts.save_image_as.clone())
        .text("enhanceFace", opts.enhance_face.to_string());

    if !opts.urls.is_empty() {
        form = form.text("urls", Value::from(opts.urls.clone()).to_string());
    }

    for (idx, image) in request.images.iter().enumerate() {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        form = form.part(format!("{idx}.file"), part);
    }

    Ok(form)
}
