//! Domain types for the emotion inference job service.
//!
//! Everything in this crate is synchronous and runtime-agnostic:
//!
//! - [`job`]: job identity and the progress state machine.
//! - [`labels`]: the fixed emotion label set and score labelling.
//! - [`collaborator`]: traits for the external media/detection/inference
//!   collaborators the job executor drives.
//! - [`preprocess`]: cropping, resizing and normalisation into model input.
//! - [`model`]: the model registry keyed by selection token.

pub mod collaborator;
pub mod error;
pub mod job;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod types;
