#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use emoti_core::collaborator::{Classifier, FrameSource, MediaError, VideoDecoder};
use emoti_core::model::{ModelRegistry, ModelSpec};
use emoti_core::preprocess::InputTensor;
use emoti_worker::locator::FullFrameLocator;
use emoti_worker::media::ImageCrateCodec;
use emoti_worker::{Collaborators, JobRunner, ProgressStore, RunnerConfig};
use http_body_util::BodyExt;
use image::{GrayImage, Luma};
use tower::ServiceExt;

use emoti_api::config::ServerConfig;
use emoti_api::router::build_app_router;
use emoti_api::state::AppState;

pub const BOUNDARY: &str = "emoti-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config(video_tmp_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_concurrent_jobs: 4,
        max_upload_bytes: 1024 * 1024,
        video_tmp_dir: video_tmp_dir.to_path_buf(),
        models_config: None,
        default_model: "model_mobilenetv2".to_string(),
        progress_retention_secs: 3600,
        progress_sweep_interval_secs: 60,
        face_locator_command: None,
        face_locator_timeout_secs: 30,
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Returns a fixed distribution that favours "Happy".
pub struct FixedClassifier;

impl Classifier for FixedClassifier {
    fn infer(&self, _input: &InputTensor) -> Result<Vec<f32>, MediaError> {
        Ok(vec![0.05, 0.05, 0.05, 0.6, 0.1, 0.05, 0.1])
    }
}

/// Serves a fixed number of blank frames regardless of the file contents.
pub struct BlankVideo {
    pub frames: u64,
}

struct BlankFrames {
    remaining: u64,
    total: u64,
}

impl VideoDecoder for BlankVideo {
    fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, MediaError> {
        Ok(Box::new(BlankFrames {
            remaining: self.frames,
            total: self.frames,
        }))
    }
}

impl FrameSource for BlankFrames {
    fn total_frames(&self) -> u64 {
        self.total
    }

    fn next_frame(&mut self) -> Result<Option<GrayImage>, MediaError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(GrayImage::from_pixel(16, 16, Luma([100]))))
    }
}

fn test_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new("model_mobilenetv2");
    for (name, size, channels) in [
        ("model_convolutional", 48, 1),
        ("model_dense", 48, 1),
        ("model_mobilenetv2", 224, 3),
    ] {
        registry
            .register(ModelSpec {
                name: name.to_string(),
                input_size: (size, size),
                channels,
                classifier: Arc::new(FixedClassifier),
            })
            .unwrap();
    }
    registry
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// A test application plus the handles tests need to inspect it.
pub struct TestApp {
    pub router: Router,
    pub runner: Arc<JobRunner>,
    pub video_tmp_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

/// Build the full application router with all middleware layers, backed by
/// fake collaborators.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack (CORS, request ID, timeout,
/// tracing, panic recovery, body limit).
pub fn build_test_app() -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let video_tmp_dir = tmp.path().join("videos");
    let config = test_config(&video_tmp_dir);

    let runner = Arc::new(JobRunner::new(
        Arc::new(ProgressStore::new()),
        Arc::new(test_registry()),
        Collaborators {
            locator: Arc::new(FullFrameLocator),
            codec: Arc::new(ImageCrateCodec::default()),
            video: Arc::new(BlankVideo { frames: 3 }),
        },
        RunnerConfig {
            max_concurrent_jobs: config.max_concurrent_jobs,
            video_tmp_dir: video_tmp_dir.clone(),
        },
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        runner: Arc::clone(&runner),
    };

    TestApp {
        router: build_app_router(state, &config),
        runner,
        video_tmp_dir,
        _tmp: tmp,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a GET request to `uri`.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// One part of a multipart form.
pub enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

/// Encode `parts` as a `multipart/form-data` body using [`BOUNDARY`].
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                filename,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart form to `uri`.
pub async fn post_multipart(app: Router, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `/progress` until the job reaches a terminal status.
///
/// Returns every observed `progress` object, the last one terminal.
pub async fn poll_progress(app: &Router, client_id: &str) -> Vec<serde_json::Value> {
    let mut seen = Vec::new();
    for _ in 0..1000 {
        let response = get(app.clone(), &format!("/progress?clientId={client_id}")).await;
        assert_eq!(response.status(), 200);
        let progress = body_json(response).await["progress"].clone();
        let status = progress["status"].as_str().unwrap().to_string();
        seen.push(progress);
        if status == "completed" || status == "failed" {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {client_id} did not finish in time");
}

/// A small grayscale PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = GrayImage::from_pixel(32, 32, Luma([128]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
