use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emoti_api::background;
use emoti_api::config::ServerConfig;
use emoti_api::router::build_app_router;
use emoti_api::state::AppState;
use emoti_core::collaborator::SubjectLocator;
use emoti_worker::locator::{CommandLocator, FullFrameLocator};
use emoti_worker::media::{FfmpegVideoDecoder, ImageCrateCodec};
use emoti_worker::models::load_registry;
use emoti_worker::{Collaborators, JobRunner, ProgressStore, RunnerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "emoti_api=debug,emoti_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Models ---
    let registry = load_registry(config.models_config.as_deref(), &config.default_model)
        .expect("Failed to load model configuration");
    tracing::info!(
        models = ?registry.tokens(),
        default = %config.default_model,
        "Model registry loaded"
    );

    // --- Face locator ---
    let locate_timeout = Duration::from_secs(config.face_locator_timeout_secs);
    let command_locator = config
        .face_locator_command
        .as_deref()
        .and_then(|line| CommandLocator::from_command_line(line, locate_timeout));
    let locator: Arc<dyn SubjectLocator> = match command_locator {
        Some(command) => {
            tracing::info!(command = ?command, "Using external face locator");
            Arc::new(command)
        }
        None => {
            tracing::info!("No face locator configured, treating each image as one face");
            Arc::new(FullFrameLocator)
        }
    };

    // --- Job runner ---
    let store = Arc::new(ProgressStore::new());
    let collaborators = Collaborators {
        locator,
        codec: Arc::new(ImageCrateCodec::default()),
        video: Arc::new(FfmpegVideoDecoder::default()),
    };
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&store),
        Arc::new(registry),
        collaborators,
        RunnerConfig {
            max_concurrent_jobs: config.max_concurrent_jobs,
            video_tmp_dir: config.video_tmp_dir.clone(),
        },
    ));
    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        video_tmp_dir = %config.video_tmp_dir.display(),
        "Job runner started"
    );

    // --- Progress retention ---
    let retention_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(background::progress_retention::run(
        Arc::clone(&store),
        Duration::from_secs(config.progress_retention_secs),
        Duration::from_secs(config.progress_sweep_interval_secs),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        runner: Arc::clone(&runner),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Progress retention stopped");

    let drained = runner
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("All in-flight jobs finished");
    } else {
        tracing::warn!(
            in_flight = runner.in_flight(),
            "Shutdown timeout elapsed with jobs still running"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
