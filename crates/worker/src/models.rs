//! Model registry construction from a JSON config file.
//!
//! ```json
//! {
//!   "models": [
//!     {
//!       "name": "model_dense",
//!       "input_size": [48, 48],
//!       "command": ["python3", "scripts/predict.py", "../model_dense.keras"],
//!       "timeout_secs": 30
//!     }
//!   ]
//! }
//! ```
//!
//! `channels` defaults to 1 for 48x48 models and 3 otherwise, matching how
//! the bundled networks were trained.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use emoti_core::error::CoreError;
use emoti_core::model::{ModelRegistry, ModelSpec};
use serde::Deserialize;

use crate::classifier::{CommandClassifier, DEFAULT_INFERENCE_TIMEOUT};

/// Side length of the grayscale models, which take a single channel.
const GRAYSCALE_MODEL_SIZE: u32 = 48;

/// Errors raised while loading the model config.
#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    #[error("failed to read model config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse model config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model entry '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error(transparent)]
    Registry(#[from] CoreError),
}

/// Top-level layout of the model config file.
#[derive(Debug, Deserialize)]
pub struct ModelsFile {
    pub models: Vec<ModelEntry>,
}

/// One model in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub input_size: [u32; 2],
    #[serde(default)]
    pub channels: Option<u8>,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ModelEntry {
    fn into_spec(self) -> Result<ModelSpec, ModelConfigError> {
        let mut command = self.command.into_iter();
        let program = command.next().filter(|p| !p.trim().is_empty()).ok_or_else(|| {
            ModelConfigError::InvalidEntry {
                name: self.name.clone(),
                reason: "command must name a program".into(),
            }
        })?;

        let channels = match self.channels {
            Some(c @ (1 | 3)) => c,
            Some(other) => {
                return Err(ModelConfigError::InvalidEntry {
                    name: self.name,
                    reason: format!("channels must be 1 or 3, got {other}"),
                })
            }
            None if self.input_size[0] == GRAYSCALE_MODEL_SIZE => 1,
            None => 3,
        };

        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INFERENCE_TIMEOUT);

        let classifier = CommandClassifier::new(&self.name, program, command.collect(), timeout);

        Ok(ModelSpec {
            name: self.name,
            input_size: (self.input_size[0], self.input_size[1]),
            channels,
            classifier: Arc::new(classifier),
        })
    }
}

/// The three networks the service ships with.
pub fn builtin_entries() -> Vec<ModelEntry> {
    [
        ("model_dense", 48),
        ("model_convolutional", 48),
        ("model_mobilenetv2", 224),
    ]
    .into_iter()
    .map(|(name, size)| ModelEntry {
        name: name.to_string(),
        input_size: [size, size],
        channels: None,
        command: vec![
            "python3".to_string(),
            "scripts/predict.py".to_string(),
            format!("../{name}.keras"),
        ],
        timeout_secs: None,
    })
    .collect()
}

/// Build a registry from config entries.
pub fn build_registry(
    entries: Vec<ModelEntry>,
    default_model: &str,
) -> Result<ModelRegistry, ModelConfigError> {
    let mut registry = ModelRegistry::new(default_model);
    for entry in entries {
        registry.register(entry.into_spec()?)?;
    }
    if registry.get(default_model).is_none() {
        return Err(ModelConfigError::InvalidEntry {
            name: default_model.to_string(),
            reason: "default model is not configured".into(),
        });
    }
    Ok(registry)
}

/// Load the registry from `path`, or the built-in models when `None`.
pub fn load_registry(
    path: Option<&Path>,
    default_model: &str,
) -> Result<ModelRegistry, ModelConfigError> {
    let entries = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ModelConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str::<ModelsFile>(&raw)?.models
        }
        None => builtin_entries(),
    };
    build_registry(entries, default_model)
}
