//! Framecast progress push infrastructure.
//!
//! - [`SubscriberRegistry`]: job id → live subscriber channels, shared via
//!   `Arc` between the HTTP layer and the job tasks.
//! - [`Subscription`]: one subscriber's receiving end; unsubscribes itself
//!   when dropped.
//! - [`JobTracker`]: which jobs this process started and how they ended,
//!   so late subscribers still see a terminal event.

pub mod registry;
pub mod tracker;

pub use registry::{SubscriberRegistry, Subscription};
pub use tracker::{JobStatus, JobTracker, RecordingEmitter};
