use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{models, predict, progress};
use crate::state::AppState;

/// Job submission, progress polling and model discovery.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(models::list_models))
        .route("/progress", get(progress::get_progress))
        .route("/predict_image", post(predict::predict_image))
        .route("/predict_video", post(predict::predict_video))
}
