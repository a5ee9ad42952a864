//! Handler for polling job progress.

use axum::extract::{Query, State};
use axum::Json;
use emoti_core::error::CoreError;
use emoti_core::job::{JobId, ProgressState};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query parameters for `GET /progress`.
#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
}

/// Response body for `GET /progress`.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub progress: ProgressState,
}

/// GET /progress?clientId={id}
///
/// Returns the job's current state without waiting on it. An unknown id
/// answers 404 with `progress.error` set, so pollers know to stop.
pub async fn get_progress(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> AppResult<Json<ProgressResponse>> {
    let raw = query
        .client_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoreError::Validation("Missing clientId query parameter".into()))?;

    let id: JobId = raw
        .parse()
        .map_err(|_| CoreError::Validation(format!("Malformed client ID '{raw}'")))?;

    let progress = state
        .runner
        .progress(&id)
        .ok_or(AppError::UnknownClient)?;

    Ok(Json(ProgressResponse { progress }))
}
