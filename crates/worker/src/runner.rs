//! Job submission and the bounded worker pool.
//!
//! [`JobRunner`] is the entry point used by the HTTP layer. A submission
//! validates its input, resolves the model, registers a fresh [`JobId`] as
//! `Pending`, hands the pipeline to a background task and returns the id
//! immediately. Background tasks wait for a permit from a semaphore sized by
//! `max_concurrent_jobs`, then run the pipeline on tokio's blocking pool so
//! request handlers are never starved by inference.
//!
//! Designed to be wrapped in `Arc` and shared via application state.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use emoti_core::job::{JobId, ProgressState};
use emoti_core::model::{ModelRegistry, ModelSpec};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::artifact::TempArtifact;
use crate::executor::{run_image_job, run_video_job, Collaborators, JobContext, JobError};
use crate::store::{ProgressStore, StoreError};

/// Default cap on concurrently executing jobs.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Errors reported synchronously by a submission. No job is created.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("The job runner is shutting down")]
    ShuttingDown,

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Tunables for [`JobRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_jobs: usize,
    /// Directory for job-local video files.
    pub video_tmp_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            video_tmp_dir: PathBuf::from("./tmp"),
        }
    }
}

/// Accepts jobs and runs them in the background.
pub struct JobRunner {
    store: Arc<ProgressStore>,
    registry: Arc<ModelRegistry>,
    collaborators: Collaborators,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    video_tmp_dir: PathBuf,
}

impl JobRunner {
    pub fn new(
        store: Arc<ProgressStore>,
        registry: Arc<ModelRegistry>,
        collaborators: Collaborators,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            collaborators,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            tracker: TaskTracker::new(),
            video_tmp_dir: config.video_tmp_dir,
        }
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// Selection tokens of every available model.
    pub fn models(&self) -> Vec<String> {
        self.registry.tokens()
    }

    /// Number of jobs submitted but not yet finished running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Current state of `id`, or `None` if it is unknown (or evicted).
    pub fn progress(&self, id: &JobId) -> Option<ProgressState> {
        self.store.get(id)
    }

    /// Submit an encoded still image for classification.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_image(&self, bytes: Vec<u8>, model: Option<&str>) -> Result<JobId, SubmitError> {
        if bytes.is_empty() {
            return Err(SubmitError::InvalidInput("Uploaded image is empty".into()));
        }
        let spec = self.resolve(model)?;
        self.ensure_accepting()?;

        let id = JobId::generate();
        self.store.register(id)?;
        tracing::info!(job_id = %id, model = %spec.name, bytes = bytes.len(), "Image job submitted");

        let ctx = self.context(id, spec);
        self.launch(ctx, "image", move |ctx| run_image_job(ctx, &bytes));
        Ok(id)
    }

    /// Submit a video for per-frame classification.
    ///
    /// The upload is written to `{video_tmp_dir}/video{id}.mp4`; the file is
    /// removed when the job ends, whatever the outcome.
    pub async fn submit_video(
        &self,
        bytes: Vec<u8>,
        model: Option<&str>,
    ) -> Result<JobId, SubmitError> {
        if bytes.is_empty() {
            return Err(SubmitError::InvalidInput("Uploaded video is empty".into()));
        }
        let spec = self.resolve(model)?;
        self.ensure_accepting()?;

        let id = JobId::generate();
        tokio::fs::create_dir_all(&self.video_tmp_dir).await?;
        let artifact = TempArtifact::new(self.video_tmp_dir.join(format!("video{id}.mp4")));
        tokio::fs::write(artifact.path(), &bytes).await?;
        self.store.register(id)?;
        tracing::info!(job_id = %id, model = %spec.name, bytes = bytes.len(), "Video job submitted");

        let ctx = self.context(id, spec);
        self.launch(ctx, "video", move |ctx| run_video_job(ctx, artifact.path()));
        Ok(id)
    }

    /// Stop accepting jobs and wait up to `timeout` for in-flight ones.
    ///
    /// Returns `true` if every job finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight jobs");
        }
        tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }

    fn resolve(&self, model: Option<&str>) -> Result<Arc<ModelSpec>, SubmitError> {
        self.registry
            .resolve(model)
            .map_err(|e| SubmitError::InvalidInput(e.to_string()))
    }

    fn ensure_accepting(&self) -> Result<(), SubmitError> {
        if self.tracker.is_closed() {
            return Err(SubmitError::ShuttingDown);
        }
        Ok(())
    }

    fn context(&self, id: JobId, model: Arc<ModelSpec>) -> JobContext {
        JobContext::new(id, Arc::clone(&self.store), model, self.collaborators.clone())
    }

    /// Run `work` in the background and publish its terminal state.
    ///
    /// Panics inside `work` are caught at the join boundary and reported as
    /// a failed job; they never reach the caller or other jobs.
    fn launch<F>(&self, ctx: JobContext, kind: &'static str, work: F)
    where
        F: FnOnce(&JobContext) -> Result<ProgressState, JobError> + Send + 'static,
    {
        let span = tracing::info_span!("job", job_id = %ctx.id(), kind, model = %ctx.model().name);
        let permits = Arc::clone(&self.permits);
        let ctx = Arc::new(ctx);

        self.tracker.spawn(
            async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        ctx.finish(Err(JobError::Aborted));
                        return;
                    }
                };
                tracing::debug!("Job started");

                let worker_ctx = Arc::clone(&ctx);
                let span = tracing::Span::current();
                let joined =
                    tokio::task::spawn_blocking(move || span.in_scope(|| work(&worker_ctx))).await;

                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
                    Err(_) => Err(JobError::Aborted),
                };
                ctx.finish(outcome);
            }
            .instrument(span),
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
