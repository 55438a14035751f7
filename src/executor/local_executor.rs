use async_trait::async_trait;
use std::time::Instant;
use tokio::process::Command;

use super::error::ExecutorError;
use super::traits::CommandExecutor;
use super::types::{CommandOutput, CommandResult};

/// Runs commands as local subprocesses via `tokio::process::Command`.
///
/// This is the only `CommandExecutor` the service ever uses in production: the
/// engine adapter always talks to the container engine on the local host.
pub struct LocalCommandExecutor;

impl Default for LocalCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for LocalCommandExecutor {
    async fn execute_command(&mut self, command: &str) -> Result<CommandResult, ExecutorError> {
        let args: Vec<&str> = command.split_whitespace().collect();
        if args.is_empty() {
            return Err(ExecutorError::LocalError("No command provided".to_string()));
        }

        let program = args[0];
        let program_args = &args[1..];

        let start_time = Instant::now();

        let output = Command::new(program)
            .args(program_args)
            .output()
            .await
            .map_err(|e| ExecutorError::LocalError(e.to_string()))?;

        let mut cmd_output = CommandOutput::new();
        cmd_output.stdout = output.stdout;
        cmd_output.stderr = output.stderr;
        cmd_output.exit_code = output.status.code().unwrap_or_default() as u32;
        cmd_output.duration = start_time.elapsed();

        Ok(CommandResult {
            command: command.to_string(),
            output: cmd_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_and_captures_stdout() {
        let mut exec = LocalCommandExecutor::new();
        let result = exec.execute_command("echo hello").await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output.to_stdout_string().unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let mut exec = LocalCommandExecutor::new();
        let result = exec.execute_command("").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let mut exec = LocalCommandExecutor::new();
        let result = exec.execute_command("false").await.unwrap();
        assert!(!result.is_success());
    }
}
