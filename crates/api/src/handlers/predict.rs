//! Handlers for submitting image and video jobs.
//!
//! Both endpoints take a multipart form with the media under `image` or
//! `video` and an optional `model` text field. They return the new job's id
//! immediately; clients poll `/progress` for the outcome.

use axum::extract::{Multipart, State};
use axum::Json;
use emoti_core::job::JobId;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response body for a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(rename = "clientId")]
    pub client_id: JobId,
}

/// Media file and model choice pulled out of a submission form.
#[derive(Debug)]
struct Upload {
    bytes: Vec<u8>,
    model: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /predict_image
pub async fn predict_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<SubmitResponse>> {
    let upload = read_upload(multipart, "image").await?;
    let id = state
        .runner
        .submit_image(upload.bytes, upload.model.as_deref())?;
    Ok(Json(SubmitResponse { client_id: id }))
}

/// POST /predict_video
pub async fn predict_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<SubmitResponse>> {
    let upload = read_upload(multipart, "video").await?;
    let id = state
        .runner
        .submit_video(upload.bytes, upload.model.as_deref())
        .await?;
    Ok(Json(SubmitResponse { client_id: id }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the file part named `part` and the optional `model` field.
///
/// A form without a file under `part` is rejected with "No {part} part in
/// the request"; a file part with an empty filename with "No {part}
/// selected for uploading". Unknown fields are ignored.
async fn read_upload(mut multipart: Multipart, part: &str) -> AppResult<Upload> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut model: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == part {
            // Plain text fields never count as the upload.
            let Some(filename) = field.file_name().map(str::to_string) else {
                continue;
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            file = Some((filename, data.to_vec()));
        } else if name == "model" {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            model = Some(text);
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest(format!("No {part} part in the request")))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No {part} selected for uploading"
        )));
    }

    tracing::debug!(part, filename = %filename, bytes = bytes.len(), "Upload received");
    Ok(Upload { bytes, model })
}
