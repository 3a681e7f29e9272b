//! Progress events pushed to subscribers of a job.
//!
//! The pipeline's overall progress is split into fixed bands: capture takes
//! 0-80, frame resolution ends at 85, encoding fills 85-99 and only the
//! terminal `completed` event carries 100.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Upper bound of the capture band.
pub const CAPTURE_END: u8 = 80;
/// Progress once the frame set has been resolved.
pub const RESOLVE_END: u8 = 85;
/// Highest value reported while the encoder is still running.
pub const ENCODE_END: u8 = 99;
/// Progress carried by the terminal `completed` event.
pub const COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

/// One push event. Optional fields are omitted from the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn queued() -> Self {
        Self {
            status: ProgressStatus::Queued,
            progress: Some(0),
            url: None,
            message: None,
        }
    }

    pub fn processing(progress: u8, message: Option<String>) -> Self {
        Self {
            status: ProgressStatus::Processing,
            progress: Some(progress.min(ENCODE_END)),
            url: None,
            message,
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Completed,
            progress: Some(COMPLETE),
            url: Some(url.into()),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Error,
            progress: None,
            url: None,
            message: Some(message.into()),
        }
    }

    /// `completed` and `error` end a job's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Error
        )
    }
}

/// Sink for a job's progress events.
///
/// Emission is synchronous and must never block: it is called from
/// subprocess output callbacks.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, job_id: JobId, event: ProgressEvent);
}

/// Map captured frames onto the capture band.
pub fn capture_percent(frames_done: u32, total_frames: u32) -> u8 {
    band(0, CAPTURE_END, frames_done, total_frames)
}

/// Map encoded frames onto the encode band.
pub fn encode_percent(frames_done: u32, total_frames: u32) -> u8 {
    band(RESOLVE_END, ENCODE_END, frames_done, total_frames)
}

fn band(start: u8, end: u8, done: u32, total: u32) -> u8 {
    if total == 0 {
        return start;
    }
    let span = u64::from(end - start);
    let done = u64::from(done.min(total));
    start + (span * done / u64::from(total)) as u8
}

/// Per-job reporter that never lets `progress` go backwards.
pub struct JobProgress<'a> {
    job_id: JobId,
    emitter: &'a dyn ProgressEmitter,
    last: AtomicU8,
}

impl<'a> JobProgress<'a> {
    pub fn new(job_id: JobId, emitter: &'a dyn ProgressEmitter) -> Self {
        Self {
            job_id,
            emitter,
            last: AtomicU8::new(0),
        }
    }

    /// Report `percent`; dropped if lower than what was already reported,
    /// or equal to it without a new message.
    pub fn report(&self, percent: u8, message: Option<&str>) {
        let percent = percent.min(ENCODE_END);
        let last = self.last.load(Ordering::Acquire);
        if percent < last || (percent == last && message.is_none()) {
            return;
        }
        self.last.store(percent, Ordering::Release);
        self.emitter.emit(
            self.job_id,
            ProgressEvent::processing(percent, message.map(str::to_string)),
        );
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.emitter.emit(self.job_id, event);
    }
}
