use std::sync::Arc;

use emoti_worker::{JobRunner, ProgressStore};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job submission and background execution.
    pub runner: Arc<JobRunner>,
}

impl AppState {
    /// Progress store shared with the runner.
    pub fn store(&self) -> &Arc<ProgressStore> {
        self.runner.store()
    }
}
