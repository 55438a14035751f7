use crate::executor::{ExecutorError, OutputError};
use thiserror::Error;

/// Errors from a *required* Engine Adapter call. Best-effort calls never
/// produce this type — a non-zero exit there is absorbed and surfaced as
/// empty output.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required command failed: {cmd}: {message}")]
    RequiredCallFailed { cmd: String, message: String },

    #[error("failed to parse engine output for `{cmd}`: {source}")]
    ParseFailed { cmd: String, source: OutputError },

    #[error("failed to execute command: {0}")]
    Execution(#[from] ExecutorError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type EngineResult<T> = Result<T, EngineError>;
