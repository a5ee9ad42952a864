//! Job executor: drives one job through its pipeline, publishing progress.
//!
//! The pipelines here are synchronous and compute-bound; [`crate::runner`]
//! runs them on the blocking thread pool. Every stage publishes an
//! `InProgress` state *before* doing its work, so a poller sees what is
//! about to happen rather than only what already happened. Each stage
//! returns an explicit `Result`; [`JobContext::finish`] turns the outcome
//! into the terminal state.

use std::path::Path;
use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use emoti_core::collaborator::{
    ImageCodec, MediaError, Region, SubjectLocator, VideoDecoder,
};
use emoti_core::job::{FramePrediction, JobId, LabeledProbability, ProgressState};
use emoti_core::labels::label_scores;
use emoti_core::model::ModelSpec;
use emoti_core::preprocess::{crop_region, normalize, resize_to};
use image::GrayImage;

use crate::store::ProgressStore;

/// Share of the progress bar spent on frames; the rest is result assembly.
const VIDEO_FRAMES_SHARE: f64 = 0.9;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a job ended in the `Failed` state.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("No Face detected in the Image")]
    NoSubjectDetected,

    #[error("Located face {0:?} lies outside the image")]
    RegionOutOfBounds(Region),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Job worker panicked: {0}")]
    Panicked(String),

    #[error("Job was aborted before it could run")]
    Aborted,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The external collaborators every job uses, shared across jobs.
#[derive(Clone)]
pub struct Collaborators {
    pub locator: Arc<dyn SubjectLocator>,
    pub codec: Arc<dyn ImageCodec>,
    pub video: Arc<dyn VideoDecoder>,
}

// ---------------------------------------------------------------------------
// JobContext
// ---------------------------------------------------------------------------

/// Everything one running job needs: its id, where to publish, which model
/// to run and the collaborators to call.
pub struct JobContext {
    id: JobId,
    store: Arc<ProgressStore>,
    model: Arc<ModelSpec>,
    collaborators: Collaborators,
}

impl JobContext {
    pub fn new(
        id: JobId,
        store: Arc<ProgressStore>,
        model: Arc<ModelSpec>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            id,
            store,
            model,
            collaborators,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Announce the stage about to run.
    fn report(&self, msg: impl Into<String>, fraction: f64) {
        self.publish(ProgressState::in_progress(msg, fraction));
    }

    fn publish(&self, state: ProgressState) {
        let status = state.status_name();
        let fraction = state.fraction();
        match self.store.update(self.id, state) {
            Ok(()) => tracing::debug!(job_id = %self.id, status, fraction, "Progress published"),
            Err(e) => {
                tracing::warn!(job_id = %self.id, status, error = %e, "Progress update rejected")
            }
        }
    }

    /// Publish the terminal state for `outcome`.
    pub fn finish(&self, outcome: Result<ProgressState, JobError>) {
        match outcome {
            Ok(state) => {
                tracing::info!(job_id = %self.id, model = %self.model.name, "Job completed");
                self.publish(state);
            }
            Err(e) => {
                tracing::warn!(job_id = %self.id, model = %self.model.name, error = %e, "Job failed");
                self.publish(ProgressState::failed(e.to_string()));
            }
        }
    }

    /// Crop `region` and resize it to the model's input size.
    fn extract_face(&self, image: &GrayImage, region: Region) -> Result<GrayImage, JobError> {
        let face = crop_region(image, region).ok_or(JobError::RegionOutOfBounds(region))?;
        Ok(resize_to(&face, self.model.input_size))
    }

    /// Normalise a face and run the model over it.
    fn classify(&self, face: &GrayImage) -> Result<Vec<LabeledProbability>, JobError> {
        let tensor = normalize(face, self.model.channels);
        let scores = self.model.classifier.infer(&tensor)?;
        Ok(label_scores(&scores)?)
    }
}

// ---------------------------------------------------------------------------
// Image pipeline
// ---------------------------------------------------------------------------

/// Classify the first face found in an encoded image.
pub fn run_image_job(ctx: &JobContext, bytes: &[u8]) -> Result<ProgressState, JobError> {
    ctx.report("Reading Image", 0.0);
    let gray = ctx.collaborators.codec.decode_gray(bytes)?;

    ctx.report("Looking for Face", 0.2);
    let regions = ctx.collaborators.locator.locate(&gray)?;
    let region = regions.first().copied().ok_or(JobError::NoSubjectDetected)?;

    ctx.report("Cropping and Resizing Image", 0.4);
    let face = ctx.extract_face(&gray, region)?;
    let face_img = BASE64_STANDARD.encode(ctx.collaborators.codec.encode_jpeg(&face)?);

    ctx.report("Preprocessing Image", 0.6);
    let tensor = normalize(&face, ctx.model.channels);

    ctx.report("Model Prediction", 0.8);
    let scores = ctx.model.classifier.infer(&tensor)?;
    let predictions = label_scores(&scores)?;

    Ok(ProgressState::completed_image(predictions, face_img))
}

// ---------------------------------------------------------------------------
// Video pipeline
// ---------------------------------------------------------------------------

/// Classify every face in every frame of the video at `path`.
///
/// Frames without a face are skipped. The decoder is released when this
/// function returns, on success or error.
pub fn run_video_job(ctx: &JobContext, path: &Path) -> Result<ProgressState, JobError> {
    ctx.report("Reading Video", 0.0);
    let mut source = ctx.collaborators.video.open(path)?;
    let total = source.total_frames();

    let mut frames = Vec::new();
    let mut index: u64 = 0;
    loop {
        index += 1;
        ctx.report(frame_label(index, total), frame_fraction(index, total));

        let Some(frame) = source.next_frame()? else {
            break;
        };

        let regions = ctx.collaborators.locator.locate(&frame)?;
        if regions.is_empty() {
            continue;
        }

        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            let face = ctx.extract_face(&frame, region)?;
            faces.push(ctx.classify(&face)?);
        }
        frames.push(FramePrediction {
            frame: index,
            faces,
        });
    }
    drop(source);

    tracing::debug!(
        job_id = %ctx.id,
        frames_read = index - 1,
        frames_with_faces = frames.len(),
        "Video stream exhausted",
    );

    Ok(ProgressState::completed_video(frames))
}

/// Stage label for frame `index` of `total` (0 = unknown).
fn frame_label(index: u64, total: u64) -> String {
    if total == 0 {
        format!("Predicting Frame {index}")
    } else {
        format!("Predicting Frame {}/{total}", index.min(total))
    }
}

/// Progress after reaching frame `index`, capped at the frame share.
fn frame_fraction(index: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    VIDEO_FRAMES_SHARE * (index.min(total) as f64 / total as f64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
