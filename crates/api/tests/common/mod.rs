#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;

use framecast_api::config::ServerConfig;
use framecast_api::router::build_app_router;
use framecast_api::state::AppState;
use framecast_core::capture::{CaptureEngine, CaptureError, CaptureRequest};
use framecast_core::encode::{EncodeError, FrameEncoder};
use framecast_core::frames::FramePattern;
use framecast_core::pipeline::RenderPipeline;
use framecast_core::types::JobId;
use framecast_events::{JobStatus, JobTracker, SubscriberRegistry};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Writes one zero-padded PNG stub per expected frame, optionally waiting
/// for a go signal first.
pub struct FakeCapture {
    gate: Option<Arc<Notify>>,
}

impl FakeCapture {
    pub fn immediate() -> Self {
        Self { gate: None }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate) }
    }
}

#[async_trait]
impl CaptureEngine for FakeCapture {
    async fn capture(
        &self,
        request: &CaptureRequest,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<u32, CaptureError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let total = request.total_frames();
        for i in 1..=total {
            tokio::fs::write(request.output_dir.join(format!("image-{i:09}.png")), b"png")
                .await?;
            on_frame(i);
        }
        Ok(total)
    }
}

/// Fails immediately, as a missing capture binary would.
pub struct MissingCapture;

#[async_trait]
impl CaptureEngine for MissingCapture {
    async fn capture(
        &self,
        _request: &CaptureRequest,
        _on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<u32, CaptureError> {
        Err(CaptureError::NotStarted(
            "failed to start 'timesnap': No such file or directory".into(),
        ))
    }
}

/// Reports one frame, then panics.
pub struct PanickingCapture;

#[async_trait]
impl CaptureEngine for PanickingCapture {
    async fn capture(
        &self,
        _request: &CaptureRequest,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<u32, CaptureError> {
        on_frame(1);
        panic!("capture engine blew up");
    }
}

/// Writes a GIF header to the requested output.
pub struct FakeEncoder {
    available: bool,
}

impl FakeEncoder {
    pub fn available() -> Self {
        Self { available: true }
    }

    pub fn missing() -> Self {
        Self { available: false }
    }
}

#[async_trait]
impl FrameEncoder for FakeEncoder {
    async fn check_available(&self) -> Result<String, EncodeError> {
        if self.available {
            Ok("fake 1.0".into())
        } else {
            Err(EncodeError::Unavailable("ffmpeg: not found".into()))
        }
    }

    async fn encode(
        &self,
        frames: &FramePattern,
        _fps: u32,
        output: &Path,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<(), EncodeError> {
        for i in 1..=frames.frame_count {
            on_frame(i);
        }
        tokio::fs::write(output, b"GIF89a-fake").await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` rooted at `work_root`.
pub fn test_config(work_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        max_body_bytes: 10 * 1024 * 1024,
        work_root: work_root.to_path_buf(),
        capture_bin: "timesnap".to_string(),
        ffmpeg_bin: "ffmpeg".to_string(),
        stage_timeout: None,
        preserve_failed_workspaces: false,
        workspace_ttl_secs: 3600,
        sweep_interval_secs: 300,
    }
}

/// The router plus the state behind it, so tests can inspect the registry
/// and workspaces.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn workspace_root(&self, job_id: JobId) -> PathBuf {
        self.state.pipeline.workspace(job_id).root().to_path_buf()
    }
}

/// Build the full application router with test doubles for capture and
/// encoding, using the same middleware stack as production.
pub fn build_test_app(
    work_root: &Path,
    capture: impl CaptureEngine + 'static,
    encoder: impl FrameEncoder + 'static,
) -> TestApp {
    let config = test_config(work_root);
    let pipeline = RenderPipeline::new(
        Arc::new(capture),
        Arc::new(encoder),
        config.work_root.clone(),
        config.preserve_failed_workspaces,
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        registry: Arc::new(SubscriberRegistry::new()),
        tracker: Arc::new(JobTracker::new()),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&json).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(10), response.into_body().collect())
        .await
        .expect("body did not finish in time")
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse the `data:` lines of an SSE body into JSON values.
pub fn sse_events(body: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

/// `POST /start` and return the accepted job id.
pub async fn start_job(app: &TestApp, json: serde_json::Value) -> JobId {
    let response = post_json(app.router.clone(), "/start", json).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    body["jobId"].as_str().unwrap().parse().unwrap()
}

/// Poll until the job's GIF is on disk.
pub async fn wait_for_artifact(app: &TestApp, job_id: JobId) {
    let workspace = app.state.pipeline.workspace(job_id);
    for _ in 0..250 {
        if workspace.has_artifact().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("artifact for job {job_id} never appeared");
}

/// Poll until the job has recorded a terminal event.
pub async fn wait_for_outcome(app: &TestApp, job_id: JobId) {
    for _ in 0..250 {
        if let Some(JobStatus::Finished(_)) = app.state.tracker.status(job_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never finished");
}

/// Poll until `job_id` has `count` live subscribers.
pub async fn wait_for_subscribers(app: &TestApp, job_id: JobId, count: usize) {
    for _ in 0..250 {
        if app.state.registry.subscriber_count(job_id) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached {count} subscribers");
}

pub fn small_job() -> serde_json::Value {
    serde_json::json!({
        "html": "<div>hi</div>",
        "css": "",
        "width": 100,
        "height": 100,
        "duration": 2,
        "fps": 30,
        "bg": "#ffffff",
    })
}
