use std::sync::Arc;

use upscale_upscayl::manager::TaskManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (read by the API-key guard).
    pub config: Arc<ServerConfig>,
    /// Task correlation layer over the Upscayl provider.
    pub task_manager: Arc<TaskManager>,
}
