//! Detached render job runner.

use std::sync::Arc;

use tokio::task::JoinHandle;

use framecast_core::progress::{ProgressEmitter, ProgressEvent};
use framecast_core::sanitize::RenderInput;
use framecast_core::types::JobId;
use framecast_events::RecordingEmitter;

use crate::state::AppState;

/// Generic message for a job whose task died without reporting.
pub const UNEXPECTED_FAILURE: &str = "Render failed unexpectedly";

/// URL clients use to fetch the finished GIF.
pub fn artifact_url(job_id: JobId) -> String {
    format!("/download/{job_id}")
}

/// Spawn `job_id` on the runtime and return immediately.
///
/// The pipeline runs in its own task so a panic inside it surfaces here as
/// a [`JoinError`](tokio::task::JoinError) and still produces a terminal
/// `error` event and a workspace cleanup.
pub fn spawn_render_job(state: &AppState, job_id: JobId, input: RenderInput) -> JoinHandle<()> {
    let pipeline = Arc::clone(&state.pipeline);
    let registry = Arc::clone(&state.registry);
    let tracker = Arc::clone(&state.tracker);

    tokio::spawn(async move {
        let task = {
            let pipeline = Arc::clone(&pipeline);
            let registry = Arc::clone(&registry);
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let emitter = RecordingEmitter::new(&tracker, &registry);
                pipeline
                    .run(job_id, input, &emitter, artifact_url(job_id))
                    .await
            })
        };

        match task.await {
            Ok(job) => {
                tracing::debug!(job_id = %job_id, state = ?job.state(), "Render task finished");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Render task aborted");
                RecordingEmitter::new(&tracker, &registry)
                    .emit(job_id, ProgressEvent::error(UNEXPECTED_FAILURE));
                pipeline
                    .workspace(job_id)
                    .release_after_failure(pipeline.preserve_failed())
                    .await;
            }
        }
    })
}
