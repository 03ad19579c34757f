pub mod identity;
pub mod models;
pub mod month;
pub mod repository;

/// Error taxonomy shared by every engine. User-visible failures carry the
/// kind plus a human-readable message; internal detail is logged, not leaked.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
