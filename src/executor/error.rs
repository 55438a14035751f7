use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    #[error("local command error: {0}")]
    LocalError(String),

    #[error("generic executor error: {0}")]
    Other(String),
}
