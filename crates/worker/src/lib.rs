//! Job execution for the emotion inference service.
//!
//! - [`store`]: the concurrent progress store pollers read from.
//! - [`executor`]: the image and video pipelines.
//! - [`runner`]: submission, the bounded worker pool and shutdown.
//! - [`media`], [`classifier`], [`locator`]: concrete collaborator adapters.
//! - [`process`]: subprocess plumbing those adapters share.
//! - [`models`]: model registry construction from config.

pub mod artifact;
pub mod classifier;
pub mod executor;
pub mod locator;
pub mod media;
pub mod models;
pub mod process;
pub mod runner;
pub mod store;

pub use executor::{Collaborators, JobError};
pub use runner::{JobRunner, RunnerConfig, SubmitError};
pub use store::{ProgressStore, StoreError};
