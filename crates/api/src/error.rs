use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use emoti_core::error::CoreError;
use emoti_worker::SubmitError;
use serde_json::json;

/// Message returned when a progress query names no tracked job.
pub const UNKNOWN_CLIENT_MSG: &str = "Unknown client ID";

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`SubmitError`] for rejected
/// job submissions. Implements [`IntoResponse`] to produce consistent JSON
/// error responses of the form `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `emoti_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job submission the runner refused.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Progress was requested for an id that is not (or no longer) tracked.
    ///
    /// The body also carries `progress.error`, which polling clients read
    /// to stop polling.
    #[error("{UNKNOWN_CLIENT_MSG}")]
    UnknownClient,
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            },

            // --- Submission errors ---
            AppError::Submit(submit) => match submit {
                SubmitError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                SubmitError::ShuttingDown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    submit.to_string(),
                ),
                SubmitError::Staging(_) | SubmitError::Store(_) => internal(&submit.to_string()),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::UnknownClient => {
                let body = json!({
                    "progress": { "error": UNKNOWN_CLIENT_MSG },
                    "error": UNKNOWN_CLIENT_MSG,
                    "code": "NOT_FOUND",
                });
                return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Log the real cause and return a sanitized 500.
fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
