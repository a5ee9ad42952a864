use std::path::PathBuf;

use emoti_core::model::DEFAULT_MODEL;
use emoti_worker::runner::DEFAULT_MAX_CONCURRENT_JOBS;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Maximum number of jobs executing at once (default: `4`).
    pub max_concurrent_jobs: usize,
    /// Request body limit for uploads, in bytes (default: 100 MiB).
    pub max_upload_bytes: usize,
    /// Where uploaded videos are staged while their job runs.
    pub video_tmp_dir: PathBuf,
    /// Optional JSON model config; the built-in models are used when unset.
    pub models_config: Option<PathBuf>,
    /// Model used when a submission does not name one.
    pub default_model: String,
    /// How long finished jobs stay queryable, in seconds (default: `3600`).
    pub progress_retention_secs: u64,
    /// How often the retention sweep runs, in seconds (default: `60`).
    pub progress_sweep_interval_secs: u64,
    /// External face detector command line; unset means every upload is
    /// treated as one whole-frame face.
    pub face_locator_command: Option<String>,
    /// Wall-clock limit for one face detector call, in seconds (default: `30`).
    pub face_locator_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                    |
    /// |--------------------------------|----------------------------|
    /// | `HOST`                         | `0.0.0.0`                  |
    /// | `PORT`                         | `5000`                     |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`        | `30`                       |
    /// | `MAX_CONCURRENT_JOBS`          | `4`                        |
    /// | `MAX_UPLOAD_BYTES`             | `104857600`                |
    /// | `VIDEO_TMP_DIR`                | `./tmp`                    |
    /// | `MODELS_CONFIG`                | unset (built-in models)    |
    /// | `DEFAULT_MODEL`                | `model_mobilenetv2`        |
    /// | `PROGRESS_RETENTION_SECS`      | `3600`                     |
    /// | `PROGRESS_SWEEP_INTERVAL_SECS` | `60`                       |
    /// | `FACE_LOCATOR_COMMAND`         | unset (whole frame)        |
    /// | `FACE_LOCATOR_TIMEOUT_SECS`    | `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .map(|v| v.parse().expect("MAX_CONCURRENT_JOBS must be a valid usize"))
            .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS);

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "104857600".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let video_tmp_dir = std::env::var("VIDEO_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./tmp"));

        let models_config = std::env::var("MODELS_CONFIG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let progress_retention_secs: u64 = std::env::var("PROGRESS_RETENTION_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("PROGRESS_RETENTION_SECS must be a valid u64");

        let progress_sweep_interval_secs: u64 = std::env::var("PROGRESS_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("PROGRESS_SWEEP_INTERVAL_SECS must be a valid u64");

        let face_locator_command = std::env::var("FACE_LOCATOR_COMMAND")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let face_locator_timeout_secs: u64 = std::env::var("FACE_LOCATOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("FACE_LOCATOR_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_concurrent_jobs,
            max_upload_bytes,
            video_tmp_dir,
            models_config,
            default_model,
            progress_retention_secs,
            progress_sweep_interval_secs,
            face_locator_command,
            face_locator_timeout_secs,
        }
    }
}
