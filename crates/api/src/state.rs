use std::sync::Arc;

use framecast_core::pipeline::RenderPipeline;
use framecast_events::{JobTracker, SubscriberRegistry};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Capture/resolve/encode wiring shared by every job.
    pub pipeline: Arc<RenderPipeline>,
    /// Progress subscribers keyed by job id.
    pub registry: Arc<SubscriberRegistry>,
    /// Jobs started by this process and their outcomes.
    pub tracker: Arc<JobTracker>,
}
