//! Ledger of jobs started by this process and how they ended.
//!
//! Progress events are not buffered, so a subscriber that attaches after a
//! job finished would otherwise wait forever. The tracker remembers each
//! job's terminal event until the artifact is downloaded or the entry ages
//! out, letting late subscribers get that event straight away.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use framecast_core::progress::{ProgressEmitter, ProgressEvent};
use framecast_core::types::JobId;

use crate::registry::SubscriberRegistry;

/// Where a tracked job stands.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running,
    /// Holds the terminal event (`completed` or `error`).
    Finished(ProgressEvent),
}

struct Entry {
    status: JobStatus,
    updated: Instant,
}

#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, Entry>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted job.
    pub fn start(&self, job_id: JobId) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                job_id,
                Entry {
                    status: JobStatus::Running,
                    updated: Instant::now(),
                },
            );
    }

    /// Record the job's terminal event. Non-terminal events are ignored.
    pub fn finish(&self, job_id: JobId, event: ProgressEvent) {
        if !event.is_terminal() {
            return;
        }
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                job_id,
                Entry {
                    status: JobStatus::Finished(event),
                    updated: Instant::now(),
                },
            );
    }

    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map(|entry| entry.status.clone())
    }

    /// Drop the entry for `job_id`. Returns whether one existed.
    pub fn forget(&self, job_id: JobId) -> bool {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id)
            .is_some()
    }

    /// Remove finished entries older than `ttl`. Running jobs are kept.
    pub fn prune_finished(&self, ttl: Duration) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            matches!(entry.status, JobStatus::Running) || entry.updated.elapsed() <= ttl
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Emitter used by running jobs: records terminal events in the tracker,
/// then publishes to live subscribers.
///
/// Recording first means a subscriber that checks the tracker after
/// subscribing either finds the terminal event there or receives it live.
pub struct RecordingEmitter<'a> {
    tracker: &'a JobTracker,
    registry: &'a SubscriberRegistry,
}

impl<'a> RecordingEmitter<'a> {
    pub fn new(tracker: &'a JobTracker, registry: &'a SubscriberRegistry) -> Self {
        Self { tracker, registry }
    }
}

impl ProgressEmitter for RecordingEmitter<'_> {
    fn emit(&self, job_id: JobId, event: ProgressEvent) {
        if event.is_terminal() {
            self.tracker.finish(job_id, event.clone());
        }
        self.registry.publish(job_id, event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn terminal_event_replaces_running() {
        let tracker = JobTracker::new();
        let id = JobId::new();
        assert_eq!(tracker.status(id), None);

        tracker.start(id);
        assert_eq!(tracker.status(id), Some(JobStatus::Running));

        tracker.finish(id, ProgressEvent::processing(40, None));
        assert_eq!(tracker.status(id), Some(JobStatus::Running));

        tracker.finish(id, ProgressEvent::error("capture failed"));
        assert_eq!(
            tracker.status(id),
            Some(JobStatus::Finished(ProgressEvent::error("capture failed")))
        );
    }

    #[test]
    fn forget_removes_entry() {
        let tracker = JobTracker::new();
        let id = JobId::new();
        tracker.start(id);

        assert!(tracker.forget(id));
        assert!(!tracker.forget(id));
        assert!(tracker.is_empty());
    }

    #[test]
    fn prune_keeps_running_jobs() {
        let tracker = JobTracker::new();
        let running = JobId::new();
        let done = JobId::new();
        tracker.start(running);
        tracker.finish(done, ProgressEvent::completed("/download/x"));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(tracker.prune_finished(Duration::from_secs(60)), 0);
        assert_eq!(tracker.prune_finished(Duration::ZERO), 1);
        assert_eq!(tracker.status(running), Some(JobStatus::Running));
        assert_eq!(tracker.status(done), None);
    }

    #[tokio::test]
    async fn recording_emitter_records_before_publishing() {
        let tracker = JobTracker::new();
        let registry = Arc::new(SubscriberRegistry::new());
        let id = JobId::new();
        tracker.start(id);
        let mut subscription = registry.subscribe(id);

        let emitter = RecordingEmitter::new(&tracker, &registry);
        emitter.emit(id, ProgressEvent::processing(10, None));
        emitter.emit(id, ProgressEvent::completed("/download/x"));

        assert_eq!(
            subscription.recv().await.map(|e| e.progress),
            Some(Some(10))
        );
        assert!(subscription.recv().await.expect("terminal").is_terminal());
        assert_eq!(
            tracker.status(id),
            Some(JobStatus::Finished(ProgressEvent::completed("/download/x")))
        );
    }
}
