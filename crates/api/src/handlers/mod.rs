//! Request handlers.
//!
//! Handlers delegate to the render pipeline and the subscriber registry
//! held in [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod render;
