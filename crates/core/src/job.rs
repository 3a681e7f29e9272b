//! Job state machine.
//!
//! `queued -> capturing -> resolving -> encoding -> completed`, with any
//! non-terminal state able to fall into `failed`. Nothing is retried.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::frames::FramePattern;
use crate::sanitize::RenderConfig;
use crate::types::{JobId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Capturing,
    Resolving,
    Encoding,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Queued, Capturing)
            | (Capturing, Resolving)
            | (Resolving, Encoding)
            | (Encoding, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid job transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One render job, alive in memory for the duration of its pipeline run.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    config: RenderConfig,
    state: JobState,
    created_at: Timestamp,
    workspace_path: Option<PathBuf>,
    frame_pattern: Option<FramePattern>,
    artifact_path: Option<PathBuf>,
}

impl Job {
    pub fn new(id: JobId, config: RenderConfig) -> Self {
        Self {
            id,
            config,
            state: JobState::Queued,
            created_at: chrono::Utc::now(),
            workspace_path: None,
            frame_pattern: None,
            artifact_path: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace_path.as_deref()
    }

    /// Present only once frames have been resolved.
    pub fn frame_pattern(&self) -> Option<&FramePattern> {
        self.frame_pattern.as_ref()
    }

    /// Present only in the `completed` state.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn attach_workspace(&mut self, path: PathBuf) {
        self.workspace_path = Some(path);
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!(job_id = %self.id, from = ?self.state, to = ?next, "Job state changed");
        self.state = next;
        Ok(())
    }

    /// Record the resolved frame pattern; the job must be resolving.
    pub fn frames_resolved(&mut self, pattern: FramePattern) -> Result<(), InvalidTransition> {
        self.transition(JobState::Encoding)?;
        self.frame_pattern = Some(pattern);
        Ok(())
    }

    pub fn complete(&mut self, artifact: PathBuf) -> Result<(), InvalidTransition> {
        self.transition(JobState::Completed)?;
        self.artifact_path = Some(artifact);
        Ok(())
    }

    /// Mark the job failed. A job already in a terminal state is left alone.
    pub fn fail(&mut self) {
        if self.transition(JobState::Failed).is_err() {
            tracing::debug!(job_id = %self.id, state = ?self.state, "Ignoring failure of finished job");
        }
    }
}
