//! Per-job workspace directories.
//!
//! Every job owns exactly one directory, `{work_root}/job-{id}/`, holding the
//! composed HTML document, the `frames/` subdirectory the capture engine
//! writes into, and finally the encoded GIF. Directory names are namespaced
//! by job id so concurrent jobs never share files.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::sanitize::{RenderConfig, RenderInput};
use crate::types::JobId;

/// Prefix of every job directory under the work root.
pub const JOB_DIR_PREFIX: &str = "job-";
/// Subdirectory receiving captured frames.
pub const FRAMES_DIR: &str = "frames";
/// Composed document the capture engine loads.
pub const DOCUMENT_FILE: &str = "index.html";
/// Final encoded artifact.
pub const ARTIFACT_FILE: &str = "banner.gif";
/// Encoder output until it is complete; renamed to [`ARTIFACT_FILE`].
pub const PARTIAL_ARTIFACT_FILE: &str = "encoding.gif";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace {0} already exists")]
    AlreadyExists(String),

    #[error("failed to prepare workspace {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Handle to one job's directory tree.
///
/// Cheap to construct; [`Workspace::locate`] only computes paths, while
/// [`Workspace::acquire`] materializes them on disk.
#[derive(Debug, Clone)]
pub struct Workspace {
    job_id: JobId,
    root: PathBuf,
}

impl Workspace {
    /// Compute the workspace location for `job_id` without touching disk.
    pub fn locate(work_root: &Path, job_id: JobId) -> Self {
        Self {
            job_id,
            root: work_root.join(format!("{JOB_DIR_PREFIX}{job_id}")),
        }
    }

    /// Create the directory tree and write the composed document.
    ///
    /// Fails if the job directory already exists.
    pub async fn acquire(
        work_root: &Path,
        job_id: JobId,
        input: &RenderInput,
    ) -> Result<Self, WorkspaceError> {
        let work_root = std::path::absolute(work_root).map_err(|e| io_error(work_root, e))?;
        tokio::fs::create_dir_all(&work_root)
            .await
            .map_err(|e| io_error(&work_root, e))?;

        let workspace = Self::locate(&work_root, job_id);
        match tokio::fs::create_dir(&workspace.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::AlreadyExists(
                    workspace.root.display().to_string(),
                ));
            }
            Err(e) => return Err(io_error(&workspace.root, e)),
        }

        let frames = workspace.frames_dir();
        if let Err(e) = tokio::fs::create_dir(&frames).await {
            workspace.release().await;
            return Err(io_error(&frames, e));
        }

        let document = compose_document(&input.config, &input.html, &input.css);
        let document_path = workspace.document_path();
        if let Err(e) = tokio::fs::write(&document_path, document).await {
            workspace.release().await;
            return Err(io_error(&document_path, e));
        }

        tracing::debug!(job_id = %job_id, path = %workspace.root.display(), "Workspace acquired");
        Ok(workspace)
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join(DOCUMENT_FILE)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root.join(ARTIFACT_FILE)
    }

    pub fn partial_artifact_path(&self) -> PathBuf {
        self.root.join(PARTIAL_ARTIFACT_FILE)
    }

    /// `file://` URL of the composed document.
    pub fn document_url(&self) -> String {
        format!("file://{}", self.document_path().display())
    }

    /// Whether the finished GIF is present on disk.
    pub async fn has_artifact(&self) -> bool {
        tokio::fs::metadata(self.artifact_path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Recursively delete the workspace.
    ///
    /// Idempotent: a missing directory counts as released. Failures are
    /// logged and never propagated. Returns `true` if the tree is gone.
    pub async fn release(&self) -> bool {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                tracing::debug!(job_id = %self.job_id, "Workspace released");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    path = %self.root.display(),
                    error = %e,
                    "Failed to remove workspace",
                );
                false
            }
        }
    }

    /// Release after a failed job, unless failed workspaces are preserved
    /// for inspection.
    pub async fn release_after_failure(&self, preserve: bool) {
        if preserve {
            tracing::warn!(
                job_id = %self.job_id,
                path = %self.root.display(),
                "Preserving failed workspace for inspection",
            );
            return;
        }
        self.release().await;
    }
}

/// Wrap the user's markup in a full document.
///
/// The injected block pins the viewport to the configured size and forces
/// the background color; user CSS follows in its own block so it can still
/// style everything else.
pub fn compose_document(config: &RenderConfig, html: &str, css: &str) -> String {
    let RenderConfig {
        width,
        height,
        background_color,
        ..
    } = config;

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
html, body {{
  margin: 0 !important;
  padding: 0 !important;
  width: {width}px !important;
  height: {height}px !important;
  overflow: hidden !important;
  background: {background_color} !important;
}}
</style>
<style>
{css}
</style>
</head>
<body>{html}</body>
</html>
"#
    )
}

/// Delete job directories under `work_root` last modified more than `ttl` ago.
///
/// Returns the number of directories removed. Entries that do not look like
/// job directories are left alone.
pub async fn sweep_expired(work_root: &Path, ttl: Duration) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(work_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix(JOB_DIR_PREFIX))
            .and_then(|id| id.parse::<JobId>().ok())
        else {
            continue;
        };

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_dir() => m,
            _ => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age > ttl && Workspace::locate(work_root, id).release().await {
            tracing::info!(job_id = %id, age_secs = age.as_secs(), "Swept abandoned workspace");
            removed += 1;
        }
    }

    Ok(removed)
}

fn io_error(path: &Path, source: io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.display().to_string(),
        source,
    }
}
