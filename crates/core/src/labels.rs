//! Emotion class labels and score labelling.

use crate::collaborator::MediaError;
use crate::job::LabeledProbability;

/// Emotion labels, index-aligned with every classifier's output vector.
pub const CLASS_LABELS: [&str; 7] = [
    "Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral",
];

/// Pair each classifier score with its label.
///
/// Fails if the classifier returned a vector whose length does not match
/// [`CLASS_LABELS`], or a score that is not a finite number.
pub fn label_scores(scores: &[f32]) -> Result<Vec<LabeledProbability>, MediaError> {
    if scores.len() != CLASS_LABELS.len() {
        return Err(MediaError::Inference(format!(
            "model returned {} scores, expected {}",
            scores.len(),
            CLASS_LABELS.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(MediaError::Inference(format!(
            "model returned a non-finite score: {bad}"
        )));
    }

    Ok(CLASS_LABELS
        .iter()
        .zip(scores)
        .map(|(label, score)| LabeledProbability {
            label: (*label).to_string(),
            probability: f64::from(*score),
        })
        .collect())
}
