//! Framecast domain core.
//!
//! Everything needed to turn a render request into a looping GIF, without
//! any HTTP concerns: parameter sanitizing, per-job workspaces, the capture
//! and encoder subprocess drivers, frame-set resolution, the job state
//! machine and the pipeline that strings them together.

pub mod capture;
pub mod encode;
pub mod error;
pub mod frames;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod sanitize;
pub mod subprocess;
pub mod types;
pub mod workspace;
