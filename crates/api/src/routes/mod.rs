pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the render route tree.
///
/// ```text
/// /start                 start a render job (POST)
/// /events/{job_id}       progress stream (SSE)
/// /download/{job_id}     finished GIF; deletes the workspace afterwards
/// ```
pub fn render_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(handlers::render::start_render))
        .route("/events/{job_id}", get(handlers::render::job_events))
        .route("/download/{job_id}", get(handlers::render::download_artifact))
}
