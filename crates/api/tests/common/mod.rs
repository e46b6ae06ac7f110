#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use upscale_api::config::{RetentionConfig, ServerConfig};
use upscale_api::router::build_app_router;
use upscale_api::state::AppState;
use upscale_core::request::UpscaleRequest;
use upscale_core::task::ProviderObservation;
use upscale_upscayl::api::{ProviderError, StartedTask, UpscaylConfig};
use upscale_upscayl::manager::{ManagerConfig, TaskManager};
use upscale_upscayl::provider::UpscaleProvider;
use upscale_upscayl::status::parse_status_response;

/// Eight-byte PNG signature; enough for format sniffing.
pub const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const FILE_BASE_URL: &str = "https://cdn.test";

/// Build a test `ServerConfig` with safe defaults.
///
/// Any CORS origin, a 30-second request timeout, and a sync budget short
/// enough that timeout tests finish quickly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        service_api_key: None,
        json_logs: false,
        upscayl: UpscaylConfig {
            api_url: "http://upscayl.invalid".to_string(),
            api_key: "test-key".to_string(),
            file_base_url: FILE_BASE_URL.to_string(),
            submit_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(5),
        },
        manager: ManagerConfig {
            sync_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
        },
        retention: RetentionConfig {
            terminal_ttl: Duration::from_secs(60),
            max_age: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        },
    }
}

/// Build the full application router around `provider` with [`test_config`].
pub fn build_test_app(provider: Arc<dyn UpscaleProvider>) -> Router {
    build_test_app_with(provider, test_config())
}

/// Build the full application router around `provider`.
///
/// Uses the production [`build_app_router`] so integration tests exercise
/// the same middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery, body limit) that production uses.
pub fn build_test_app_with(provider: Arc<dyn UpscaleProvider>, config: ServerConfig) -> Router {
    let task_manager = Arc::new(TaskManager::new(provider, config.manager.clone()));
    let state = AppState {
        config: Arc::new(config.clone()),
        task_manager,
    };
    build_app_router(state, &config).unwrap()
}

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

/// In-memory provider that accepts every submission and answers status
/// polls from a script of raw Upscayl status strings.
///
/// Once the script runs out every poll reports `fallback`. Every
/// observation lists two output files: one by `url`, one by `path`.
pub struct FakeProvider {
    statuses: Mutex<VecDeque<&'static str>>,
    fallback: &'static str,
    reject_start: Option<u16>,
    failure_message: Option<&'static str>,
    starts: AtomicUsize,
    polls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(statuses: &[&'static str], fallback: &'static str) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            fallback,
            reject_start: None,
            failure_message: None,
            starts: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }

    /// A provider whose `start-task` always fails with `status`.
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_start: Some(status),
            ..Self::new(&[], "pending")
        }
    }

    /// A provider that fails every task with `message`.
    pub fn failing(message: &'static str) -> Self {
        Self {
            failure_message: Some(message),
            ..Self::new(&[], "failed")
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpscaleProvider for FakeProvider {
    async fn start_task(&self, _request: &UpscaleRequest) -> Result<StartedTask, ProviderError> {
        if let Some(status) = self.reject_start {
            return Err(ProviderError::Api {
                status,
                body: "rejected".to_string(),
            });
        }
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        let provider_task_id = format!("up-{n}");
        Ok(StartedTask {
            payload: json!({ "data": { "taskId": provider_task_id } }),
            provider_task_id,
        })
    }

    async fn task_status(
        &self,
        provider_task_id: &str,
    ) -> Result<ProviderObservation, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        let body = json!({
            "data": {
                "status": status,
                "files": [
                    { "url": format!("https://cdn.test/{provider_task_id}/0.jpg") },
                    { "path": format!("{provider_task_id}/1.jpg") },
                ],
                "error": self.failure_message,
            }
        });
        Ok(parse_status_response(body, FILE_BASE_URL))
    }
}

// ---------------------------------------------------------------------------
// Multipart bodies
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "upscale-test-boundary";

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct MultipartBody {
    buf: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    /// A single valid PNG upload.
    pub fn png() -> Self {
        Self::new().file("files", "cat.png", "image/png", PNG_MAGIC)
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a GET request carrying an `X-API-Key` header.
pub async fn get_with_key(app: Router, uri: &str, key: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("x-api-key", key)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a multipart form, optionally with an `X-API-Key` header.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    body: MultipartBody,
    key: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header(
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder.body(Body::from(body.finish())).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a status code and return the JSON body.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
