use async_trait::async_trait;

use super::{CommandResult, ExecutorError};

/// A trait for executing commands in a uniform way. The engine adapter is built
/// entirely on top of this so tests can substitute an in-memory fake instead of
/// spawning real `docker`/`docker compose` processes.
#[async_trait]
pub trait CommandExecutor: Send {
    /// Execute a command and return a `CommandResult` containing stdout/stderr/exit code.
    async fn execute_command(&mut self, command: &str) -> Result<CommandResult, ExecutorError>;
}
