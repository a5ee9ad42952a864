use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /models
///
/// Selection tokens of every configured model, sorted.
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.runner.models())
}
