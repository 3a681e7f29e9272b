//! Render pipeline orchestration.
//!
//! [`RenderPipeline::run`] takes one sanitized request through every stage:
//! workspace, capture, frame resolution, encoding. It reports progress as it
//! goes and always ends with exactly one terminal event. Failed workspaces
//! are released here; successful ones stay until the artifact is downloaded.

use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::{CaptureEngine, CaptureError, CaptureRequest};
use crate::encode::{EncodeError, FrameEncoder};
use crate::frames::{self, FrameSetError};
use crate::job::{InvalidTransition, Job, JobState};
use crate::progress::{self, JobProgress, ProgressEmitter, ProgressEvent};
use crate::sanitize::RenderInput;
use crate::types::JobId;
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Workspace setup failed: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Frame check failed: {0}")]
    Frames(#[from] FrameSetError),

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Internal error: {0}")]
    State(#[from] InvalidTransition),
}

/// The stage wiring shared by every job.
#[derive(Clone)]
pub struct RenderPipeline {
    capture: Arc<dyn CaptureEngine>,
    encoder: Arc<dyn FrameEncoder>,
    work_root: PathBuf,
    preserve_failed: bool,
}

impl RenderPipeline {
    pub fn new(
        capture: Arc<dyn CaptureEngine>,
        encoder: Arc<dyn FrameEncoder>,
        work_root: PathBuf,
        preserve_failed: bool,
    ) -> Self {
        Self {
            capture,
            encoder,
            work_root,
            preserve_failed,
        }
    }

    pub fn encoder(&self) -> &dyn FrameEncoder {
        self.encoder.as_ref()
    }

    pub fn preserve_failed(&self) -> bool {
        self.preserve_failed
    }

    /// Where `job_id`'s workspace lives (whether or not it exists).
    pub fn workspace(&self, job_id: JobId) -> Workspace {
        Workspace::locate(&self.work_root, job_id)
    }

    /// Run one job to a terminal state.
    ///
    /// `artifact_url` is sent with the `completed` event. The returned job is
    /// either `completed` or `failed`; the failure itself has already been
    /// reported through `emitter`.
    pub async fn run(
        &self,
        job_id: JobId,
        input: RenderInput,
        emitter: &dyn ProgressEmitter,
        artifact_url: String,
    ) -> Job {
        let mut job = Job::new(job_id, input.config.clone());
        let progress = JobProgress::new(job_id, emitter);
        progress.emit(ProgressEvent::queued());

        match self.execute(&mut job, &input, &progress).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = elapsed_ms(&job),
                    workspace = ?job.workspace_path(),
                    "Render job completed",
                );
                progress.emit(ProgressEvent::completed(artifact_url));
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    state = ?job.state(),
                    elapsed_ms = elapsed_ms(&job),
                    error = %e,
                    "Render job failed",
                );
                job.fail();
                progress.emit(ProgressEvent::error(e.to_string()));
                // A directory that already existed belongs to someone else.
                if !matches!(
                    e,
                    PipelineError::Workspace(WorkspaceError::AlreadyExists(_))
                ) {
                    self.workspace(job_id)
                        .release_after_failure(self.preserve_failed)
                        .await;
                }
            }
        }
        job
    }

    async fn execute(
        &self,
        job: &mut Job,
        input: &RenderInput,
        progress: &JobProgress<'_>,
    ) -> Result<(), PipelineError> {
        let config = input.config.clone();
        let total_frames = config.total_frames();

        let workspace = Workspace::acquire(&self.work_root, job.id(), input).await?;
        job.attach_workspace(workspace.root().to_path_buf());

        // --- Capture ---
        job.transition(JobState::Capturing)?;
        progress.report(0, Some("Capturing frames"));
        let request = CaptureRequest {
            url: workspace.document_url(),
            width: config.width,
            height: config.height,
            duration_secs: config.duration_secs,
            fps: config.fps,
            output_dir: workspace.frames_dir(),
            transparent: config.is_transparent(),
        };
        let reported = self
            .capture
            .capture(&request, &|frame| {
                progress.report(progress::capture_percent(frame, total_frames), None)
            })
            .await?;
        tracing::debug!(job_id = %job.id(), reported, expected = total_frames, "Capture finished");

        // --- Resolve ---
        job.transition(JobState::Resolving)?;
        progress.report(progress::CAPTURE_END, Some("Checking frames"));
        let pattern = frames::resolve(&workspace.frames_dir(), total_frames).await?;
        let encode_total = pattern.frame_count.min(total_frames);
        job.frames_resolved(pattern.clone())?;

        // --- Encode ---
        progress.report(progress::RESOLVE_END, Some("Encoding GIF"));
        // Encode under a temporary name so a half-written GIF is never
        // mistaken for a finished artifact.
        let partial = workspace.partial_artifact_path();
        self.encoder
            .encode(&pattern, config.fps, &partial, &|frame| {
                progress.report(progress::encode_percent(frame, encode_total), None)
            })
            .await?;
        let artifact = workspace.artifact_path();
        tokio::fs::rename(&partial, &artifact)
            .await
            .map_err(EncodeError::Io)?;

        job.complete(artifact)?;
        Ok(())
    }
}

fn elapsed_ms(job: &Job) -> i64 {
    (chrono::Utc::now() - job.created_at()).num_milliseconds()
}
