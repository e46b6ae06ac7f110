#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider rejected the request, failed the task, or could not be reached.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The synchronous wait budget elapsed before the provider finished.
    #[error("Upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },
}
