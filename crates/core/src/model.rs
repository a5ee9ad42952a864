//! Model registry keyed by selection token.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::collaborator::Classifier;
use crate::error::CoreError;
use crate::types::Dimensions;

/// Token used when a submission does not name a model.
pub const DEFAULT_MODEL: &str = "model_mobilenetv2";

/// A loaded model and the input shape it expects.
pub struct ModelSpec {
    pub name: String,
    pub input_size: Dimensions,
    /// 1 for grayscale models, 3 for models trained on RGB input.
    pub channels: u8,
    pub classifier: Arc<dyn Classifier>,
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("input_size", &self.input_size)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// Fixed set of available models, built once at startup.
#[derive(Debug)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<ModelSpec>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            models: BTreeMap::new(),
            default_model: default_model.into(),
        }
    }

    /// Add a model. Fails if the name is empty or already taken.
    pub fn register(&mut self, spec: ModelSpec) -> Result<(), CoreError> {
        if spec.name.trim().is_empty() {
            return Err(CoreError::Validation("Model name must not be empty".into()));
        }
        if spec.input_size.0 == 0 || spec.input_size.1 == 0 {
            return Err(CoreError::Validation(format!(
                "Model '{}' must have a non-zero input size",
                spec.name
            )));
        }
        if self.models.contains_key(&spec.name) {
            return Err(CoreError::Conflict(format!(
                "Model '{}' is already registered",
                spec.name
            )));
        }
        self.models.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    /// Registered tokens in sorted order.
    pub fn tokens(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn get(&self, token: &str) -> Option<Arc<ModelSpec>> {
        self.models.get(token).cloned()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve a client-supplied token, falling back to the default model
    /// when none (or a blank one) was given.
    pub fn resolve(&self, token: Option<&str>) -> Result<Arc<ModelSpec>, CoreError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.default_model);

        self.get(token).ok_or_else(|| {
            CoreError::Validation(format!(
                "Unknown model '{token}'. Available models: {}",
                self.tokens().join(", ")
            ))
        })
    }
}
