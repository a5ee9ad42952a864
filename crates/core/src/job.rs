//! Job identity and the progress state machine.
//!
//! A job moves `Pending -> InProgress* -> (Completed | Failed)`. The two
//! terminal states are final; the progress store refuses further writes once
//! one of them has been published.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque identifier for one submitted job.
///
/// Backed by a random (v4) UUID, so no uniqueness check against existing
/// jobs is needed. Serialized as the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Probability assigned to one emotion label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledProbability {
    pub label: String,
    pub probability: f64,
}

/// Predictions for a single video frame that contained at least one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePrediction {
    /// 1-based frame index within the stream.
    pub frame: u64,
    /// One labelled probability list per face located in the frame.
    pub faces: Vec<Vec<LabeledProbability>>,
}

/// Result payload carried by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predictions {
    Image(Vec<LabeledProbability>),
    Video(Vec<FramePrediction>),
}

// ---------------------------------------------------------------------------
// ProgressState
// ---------------------------------------------------------------------------

/// Stage label published with the terminal success state.
pub const COMPLETED_MSG: &str = "Completed";

/// Current snapshot of a job's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressState {
    /// Registered, no work observed yet.
    Pending,
    /// A stage is about to run (or running).
    InProgress { msg: String, fraction: f64 },
    /// Terminal success. `fraction` is always 1.0.
    Completed {
        msg: String,
        fraction: f64,
        predictions: Predictions,
        /// Base64 JPEG of the located face (image jobs only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        face_img: Option<String>,
    },
    /// Terminal failure.
    Failed { error: String },
}

impl ProgressState {
    /// Build an in-progress state. `fraction` is clamped into `0.0..=1.0`.
    pub fn in_progress(msg: impl Into<String>, fraction: f64) -> Self {
        Self::InProgress {
            msg: msg.into(),
            fraction: clamp_fraction(fraction),
        }
    }

    pub fn completed_image(predictions: Vec<LabeledProbability>, face_img: String) -> Self {
        Self::Completed {
            msg: COMPLETED_MSG.to_string(),
            fraction: 1.0,
            predictions: Predictions::Image(predictions),
            face_img: Some(face_img),
        }
    }

    pub fn completed_video(frames: Vec<FramePrediction>) -> Self {
        Self::Completed {
            msg: COMPLETED_MSG.to_string(),
            fraction: 1.0,
            predictions: Predictions::Video(frames),
            face_img: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Whether no further updates may follow this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Completion fraction, or `None` for a failed job.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Pending => Some(0.0),
            Self::InProgress { fraction, .. } | Self::Completed { fraction, .. } => Some(*fraction),
            Self::Failed { .. } => None,
        }
    }

    /// Short lowercase name of the variant, used in logs.
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress { .. } => "in_progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
