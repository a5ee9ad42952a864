//! Subprocess-backed classifier.
//!
//! [`CommandClassifier`] hands each preprocessed tensor to an external
//! program (typically a small Python wrapper around the trained network):
//! the tensor is written to stdin as JSON and a JSON array of class scores
//! is read back from stdout. The whole exchange, stdin write included, runs
//! under the configured timeout and the program is killed when it expires.

use std::time::Duration;

use emoti_core::collaborator::{Classifier, MediaError};
use emoti_core::preprocess::InputTensor;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::process::{run_piped, BlockingRuntime};

/// Default wall-clock limit for one inference call.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// JSON document written to the program's stdin.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    input: &'a InputTensor,
}

/// Accepts both a flat score vector and a batch of one (`[[...]]`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceOutput {
    Flat(Vec<f32>),
    Batched(Vec<Vec<f32>>),
}

/// [`Classifier`] that runs an external command per inference.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    model: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(
        model: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            program: program.into(),
            args,
            timeout,
        }
    }

    fn failure(&self, detail: impl std::fmt::Display) -> MediaError {
        MediaError::Inference(format!("model '{}': {detail}", self.model))
    }
}

impl Classifier for CommandClassifier {
    fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, MediaError> {
        let payload = serde_json::to_vec(&InferenceRequest {
            model: &self.model,
            input,
        })
        .map_err(|e| self.failure(format!("failed to serialize input: {e}")))?;

        let runtime = BlockingRuntime::acquire().map_err(|e| self.failure(e))?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = runtime
            .block_on(run_piped(&mut cmd, Some(&payload), self.timeout))
            .map_err(|e| self.failure(e))?;

        if !output.status.success() {
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_scores(&output.stdout).map_err(|e| self.failure(e))
    }
}

fn parse_scores(stdout: &[u8]) -> Result<Vec<f32>, String> {
    let text = String::from_utf8_lossy(stdout);
    let output: InferenceOutput = serde_json::from_str(text.trim())
        .map_err(|e| format!("invalid output ({e}): {}", text.trim()))?;

    match output {
        InferenceOutput::Flat(scores) => Ok(scores),
        InferenceOutput::Batched(mut batch) if batch.len() == 1 => Ok(batch.remove(0)),
        InferenceOutput::Batched(batch) => Err(format!(
            "expected a single prediction, got a batch of {}",
            batch.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tensor() -> InputTensor {
        InputTensor {
            width: 1,
            height: 1,
            channels: 1,
            data: vec![0.5],
        }
    }

    fn shell(model: &str, script: &str, timeout: Duration) -> CommandClassifier {
        CommandClassifier::new(
            model,
            "sh",
            vec!["-c".to_string(), script.to_string()],
            timeout,
        )
    }

    // -- parse_scores ---------------------------------------------------------

    #[test]
    fn parses_flat_scores() {
        assert_eq!(parse_scores(b"[0.25, 0.75]\n").unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn parses_batch_of_one() {
        assert_eq!(parse_scores(b"[[0.1, 0.9]]").unwrap(), vec![0.1, 0.9]);
    }

    #[test]
    fn rejects_larger_batches_and_garbage() {
        assert!(parse_scores(b"[[0.1], [0.9]]").is_err());
        assert!(parse_scores(b"warming up...").is_err());
    }

    // -- CommandClassifier ----------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn runs_command_and_reads_scores() {
        let classifier = shell(
            "model_dense",
            "cat > /dev/null; echo '[0.1,0.2,0.3,0.1,0.1,0.1,0.1]'",
            DEFAULT_INFERENCE_TIMEOUT,
        );
        let scores = classifier.infer(&tensor()).unwrap();
        assert_eq!(scores.len(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn command_receives_tensor_on_stdin() {
        let classifier = shell(
            "model_dense",
            "grep -q '\"model\":\"model_dense\"' && echo '[1.0]'",
            DEFAULT_INFERENCE_TIMEOUT,
        );
        assert_eq!(classifier.infer(&tensor()).unwrap(), vec![1.0]);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_inference_error() {
        let classifier = shell("m", "echo 'no weights' >&2; exit 3", DEFAULT_INFERENCE_TIMEOUT);
        let err = classifier.infer(&tensor()).unwrap_err();
        assert_matches!(&err, MediaError::Inference(msg) if msg.contains("no weights"));
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let classifier = shell("m", "sleep 5", Duration::from_millis(100));
        let err = classifier.infer(&tensor()).unwrap_err();
        assert_matches!(&err, MediaError::Inference(msg) if msg.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn full_size_tensor_to_a_command_that_ignores_stdin_times_out() {
        let input = InputTensor {
            width: 224,
            height: 224,
            channels: 3,
            data: vec![0.5; 224 * 224 * 3],
        };
        let classifier = shell("model_resnet", "sleep 4", Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = classifier.infer(&input).unwrap_err();

        assert_matches!(&err, MediaError::Inference(msg) if msg.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_inside_blocking_worker() {
        let classifier = shell("m", "cat > /dev/null; echo '[[0.4, 0.6]]'", DEFAULT_INFERENCE_TIMEOUT);
        let scores = tokio::task::spawn_blocking(move || classifier.infer(&tensor()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scores, vec![0.4, 0.6]);
    }

    #[test]
    fn missing_program_is_inference_error() {
        let classifier = CommandClassifier::new(
            "m",
            "/nonexistent/emoti-classifier",
            vec![],
            DEFAULT_INFERENCE_TIMEOUT,
        );
        assert_matches!(classifier.infer(&tensor()), Err(MediaError::Inference(_)));
    }
}
