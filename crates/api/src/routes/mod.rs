pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the public route tree.
///
/// Route hierarchy:
///
/// ```text
/// /models                      available model tokens (GET)
/// /progress?clientId={id}      job progress (GET)
/// /predict_image               submit an image job (POST, multipart)
/// /predict_video               submit a video job (POST, multipart)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(jobs::router())
}
