//! Shared-secret guard for the upscale endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use upscale_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Header the caller puts the service key in.
pub const SERVICE_KEY_HEADER: &str = "x-api-key";

/// Proof that the caller presented the configured service key.
///
/// When `SERVICE_API_KEY` is unset every request passes. Add this as an
/// extractor parameter to any handler that should be protected:
///
/// ```ignore
/// async fn my_handler(_key: ServiceKey) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ServiceKey;

impl FromRequestParts<AppState> for ServiceKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.service_api_key.as_deref() else {
            return Ok(ServiceKey);
        };

        let presented = parts
            .headers
            .get(SERVICE_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing X-API-Key header".into()))
            })?;

        if !keys_match(presented, expected) {
            tracing::warn!("Rejected request with invalid service API key");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid API key".into(),
            )));
        }

        Ok(ServiceKey)
    }
}

/// Compare keys via their SHA-256 digests so the comparison always runs
/// over the same number of bytes, whatever the presented length.
fn keys_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
