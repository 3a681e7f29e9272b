//! Job execution engine.
//!
//! Runs each render job as a detached task, decoupled from the request that
//! started it.

pub mod runner;
