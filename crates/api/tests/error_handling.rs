//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests verify that each `AppError` variant produces the correct HTTP
//! status code, error code, and message. They do NOT need an HTTP server --
//! they call `IntoResponse` directly on `AppError` values.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use emoti_api::error::AppError;
use emoti_core::error::CoreError;
use emoti_worker::SubmitError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: AppError::UnknownClient maps to 404 and carries progress.error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_client_returns_404_with_progress_error() {
    let (status, json) = error_to_response(AppError::UnknownClient).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Unknown client ID");
    assert_eq!(json["progress"]["error"], "Unknown client ID");
}

// ---------------------------------------------------------------------------
// Test: validation failures map to 400 with VALIDATION_ERROR code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("Malformed client ID 'x'".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Malformed client ID 'x'");
}

#[tokio::test]
async fn invalid_submission_returns_400() {
    let err = AppError::Submit(SubmitError::InvalidInput("Uploaded image is empty".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Uploaded image is empty");
}

// ---------------------------------------------------------------------------
// Test: AppError::BadRequest maps to 400 with BAD_REQUEST code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("No image part in the request".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "No image part in the request");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Conflict maps to 409 with CONFLICT code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("duplicate model".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Test: a draining runner maps to 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutting_down_returns_503() {
    let (status, json) = error_to_response(AppError::Submit(SubmitError::ShuttingDown)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SHUTTING_DOWN");
}

// ---------------------------------------------------------------------------
// Test: internal failures map to 500 and sanitize the message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn staging_failure_returns_500_and_sanitizes_message() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/srv/tmp denied");
    let (status, json) = error_to_response(AppError::Submit(SubmitError::Staging(io))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json["error"].as_str().unwrap().contains("/srv/tmp"));
}
