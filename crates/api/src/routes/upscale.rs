//! Route definitions for the `/upscale` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::upscale;
use crate::state::AppState;

/// Routes mounted at `/upscale`.
///
/// ```text
/// POST   /images            -> submit_images        (async, returns task_id)
/// POST   /images-sync       -> submit_images_sync   (blocks until done)
/// GET    /task/{task_id}    -> get_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/images", post(upscale::submit_images))
        .route("/images-sync", post(upscale::submit_images_sync))
        .route("/task/{task_id}", get(upscale::get_task))
}
