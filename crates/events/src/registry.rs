//! Subscriber registry keyed by job id.
//!
//! Events are delivered at most once to whoever is subscribed at the moment
//! of emission; nothing is buffered for later subscribers. A terminal event
//! closes every channel of its job and drops the job's entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use framecast_core::progress::{ProgressEmitter, ProgressEvent};
use framecast_core::types::JobId;
use tokio::sync::mpsc;

/// Channel sender half for pushing events to one subscriber.
pub type EventSender = mpsc::UnboundedSender<ProgressEvent>;

struct Subscriber {
    id: u64,
    sender: EventSender,
}

/// Thread-safe map of job id to subscriber channels.
///
/// Uses a synchronous lock because emission happens inside subprocess
/// output callbacks and unsubscription inside `Drop`; the lock is never
/// held across an await point.
pub struct SubscriberRegistry {
    channels: RwLock<HashMap<JobId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a new subscriber to `job_id`.
    pub fn subscribe(self: &Arc<Self>, job_id: JobId) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id)
            .or_default()
            .push(Subscriber { id, sender });
        tracing::debug!(job_id = %job_id, subscriber = id, "Subscriber attached");

        Subscription {
            job_id,
            id,
            receiver,
            registry: Arc::clone(self),
        }
    }

    /// Detach one subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, job_id: JobId, subscriber_id: u64) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = channels.get_mut(&job_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                channels.remove(&job_id);
            }
            tracing::debug!(job_id = %job_id, subscriber = subscriber_id, "Subscriber detached");
        }
    }

    /// Deliver `event` to every current subscriber of `job_id`.
    ///
    /// Returns the number of subscribers reached. Closed channels are pruned;
    /// a terminal event removes the job entry altogether.
    pub fn publish(&self, job_id: JobId, event: ProgressEvent) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = channels.get_mut(&job_id) else {
            tracing::trace!(job_id = %job_id, status = ?event.status, "No subscriber, event dropped");
            return 0;
        };

        subscribers.retain(|s| s.sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        if event.is_terminal() || subscribers.is_empty() {
            channels.remove(&job_id);
        }
        delivered
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map_or(0, Vec::len)
    }

    /// Number of jobs with at least one subscriber.
    pub fn job_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every channel, ending all open subscriptions.
    pub fn close_all(&self) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let count: usize = channels.values().map(Vec::len).sum();
        channels.clear();
        tracing::info!(count, "Closed all progress subscriptions");
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEmitter for SubscriberRegistry {
    fn emit(&self, job_id: JobId, event: ProgressEvent) {
        self.publish(job_id, event);
    }
}

/// Receiving end of one subscriber.
pub struct Subscription {
    job_id: JobId,
    id: u64,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    /// Next event, or `None` once the job's channel has been closed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.job_id, self.id);
    }
}
