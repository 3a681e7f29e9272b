#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Required tool unavailable: {0}")]
    Preflight(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
