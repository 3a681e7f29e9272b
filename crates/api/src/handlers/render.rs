//! Handlers for starting render jobs, streaming their progress, and
//! downloading the finished GIF.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use framecast_core::error::CoreError;
use framecast_core::progress::ProgressEvent;
use framecast_core::sanitize::{self, RenderRequest};
use framecast_core::types::JobId;
use framecast_core::workspace::ARTIFACT_FILE;
use framecast_events::JobStatus;

use crate::engine::runner::{self, artifact_url};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a path segment as a job id. Anything else is an unknown job.
fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse().map_err(|_| job_not_found(raw))
}

fn job_not_found(id: impl ToString) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: JobId,
}

// ---------------------------------------------------------------------------
// POST /start
// ---------------------------------------------------------------------------

/// Validate the request, check the encoder is runnable, and start a job.
///
/// Responds `202 Accepted` with `{"jobId"}` as soon as the job is spawned;
/// all rendering happens afterwards.
pub async fn start_render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = sanitize::sanitize(request)?;

    let version = state
        .pipeline
        .encoder()
        .check_available()
        .await
        .map_err(|e| CoreError::Preflight(e.to_string()))?;

    let job_id = JobId::new();
    state.tracker.start(job_id);
    tracing::info!(
        job_id = %job_id,
        width = input.config.width,
        height = input.config.height,
        duration_secs = input.config.duration_secs,
        fps = input.config.fps,
        encoder = %version,
        "Render job accepted",
    );
    runner::spawn_render_job(&state, job_id, input);

    Ok((StatusCode::ACCEPTED, Json(StartResponse { job_id })))
}

// ---------------------------------------------------------------------------
// GET /events/{job_id}
// ---------------------------------------------------------------------------

/// Server-sent progress events for one job.
///
/// Each event's data is a JSON progress object. The stream ends after the
/// terminal event. A job that has already finished gets its terminal event
/// replayed; other milestones that fired before the subscriber attached are
/// not. Ids this process never started (or whose artifact was downloaded)
/// answer 404 unless a finished artifact is on disk.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job_id = parse_job_id(&job_id)?;

    // Subscribe before checking for an outcome: terminal events are recorded
    // before they are published, so one of the two paths always sees them.
    let subscription = state.registry.subscribe(job_id);

    let replay = match state.tracker.status(job_id) {
        Some(JobStatus::Finished(event)) => Some(event),
        Some(JobStatus::Running) => None,
        None => {
            if !state.pipeline.workspace(job_id).has_artifact().await {
                return Err(job_not_found(job_id));
            }
            Some(ProgressEvent::completed(artifact_url(job_id)))
        }
    };

    let events: BoxStream<'static, ProgressEvent> = match replay {
        Some(event) => {
            drop(subscription);
            tracing::debug!(job_id = %job_id, status = ?event.status, "Replaying outcome to late subscriber");
            stream::iter([event]).boxed()
        }
        None => {
            tracing::debug!(job_id = %job_id, "Progress subscriber attached");
            stream::unfold(subscription, |mut subscription| async move {
                subscription
                    .recv()
                    .await
                    .map(|event| (event, subscription))
            })
            .boxed()
        }
    };

    let events = events.map(|event| Event::default().json_data(&event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ---------------------------------------------------------------------------
// GET /download/{job_id}
// ---------------------------------------------------------------------------

/// Stream the finished GIF as `banner.gif`.
///
/// The job's workspace is deleted once the whole body has been sent. A
/// download that is interrupted leaves the workspace for the sweeper.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job_id = parse_job_id(&job_id)?;
    let workspace = state.pipeline.workspace(job_id);

    let file = match tokio::fs::File::open(workspace.artifact_path()).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(job_not_found(job_id)),
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "Failed to open artifact for job {job_id}: {e}"
            )))
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let tracker = Arc::clone(&state.tracker);
    let cleanup = stream::once(async move {
        tracker.forget(job_id);
        if workspace.release().await {
            tracing::info!(job_id = %job_id, "Artifact downloaded, workspace released");
        }
        None::<io::Result<Bytes>>
    })
    .filter_map(futures::future::ready);
    let body = Body::from_stream(ReaderStream::new(file).chain(cleanup));

    let mut response = (
        [
            (header::CONTENT_TYPE, "image/gif".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARTIFACT_FILE}\""),
            ),
        ],
        body,
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}
