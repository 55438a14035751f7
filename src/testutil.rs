//! Shared test doubles: a `MockExecutor` with responses keyed by the exact
//! command string, plus a call log so invariants like "no tag call for an
//! unchanged service" can be asserted directly.

use crate::executor::{CommandExecutor, CommandOutput, CommandResult, ExecutorError};
use async_trait::async_trait;
use std::collections::HashMap;

pub struct MockExecutor {
    responses: HashMap<String, Result<CommandResult, ExecutorError>>,
    /// Per-command queues, drained in order before falling back to
    /// `responses`. Lets a single command string answer differently across
    /// successive calls, e.g. a verifier poll loop watching a restart count.
    sequences: HashMap<String, std::collections::VecDeque<Result<CommandResult, ExecutorError>>>,
    pub commands: Vec<String>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            sequences: HashMap::new(),
            commands: Vec::new(),
        }
    }

    pub fn ok(&mut self, command: impl Into<String>, stdout: impl Into<String>) {
        let mut result = CommandResult::new("mock");
        result.output = CommandOutput::new();
        result.output.stdout = stdout.into().into_bytes();
        result.output.exit_code = 0;
        self.responses.insert(command.into(), Ok(result));
    }

    pub fn fail(&mut self, command: impl Into<String>, stderr: impl Into<String>) {
        let mut result = CommandResult::new("mock");
        result.output = CommandOutput::new();
        result.output.stderr = stderr.into().into_bytes();
        result.output.exit_code = 1;
        self.responses.insert(command.into(), Ok(result));
    }

    pub fn error(&mut self, command: impl Into<String>, message: impl Into<String>) {
        self.responses
            .insert(command.into(), Err(ExecutorError::Other(message.into())));
    }

    /// Queue a sequence of stdout responses for one command string, returned
    /// one per call in order; once exhausted, falls back to `ok`/`fail`/
    /// `error` registrations (or the default empty success).
    pub fn ok_sequence(&mut self, command: impl Into<String>, stdouts: Vec<String>) {
        let queue = self.sequences.entry(command.into()).or_default();
        for stdout in stdouts {
            let mut result = CommandResult::new("mock");
            result.output = CommandOutput::new();
            result.output.stdout = stdout.into_bytes();
            result.output.exit_code = 0;
            queue.push_back(Ok(result));
        }
    }

    pub fn calls_for(&self, prefix: &str) -> usize {
        self.commands.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute_command(&mut self, command: &str) -> Result<CommandResult, ExecutorError> {
        self.commands.push(command.to_string());
        if let Some(queue) = self.sequences.get_mut(command) {
            if let Some(r) = queue.pop_front() {
                return r;
            }
        }
        match self.responses.get(command) {
            Some(r) => r.clone(),
            None => {
                // Unregistered commands succeed with empty output by default,
                // mirroring a best-effort engine call that has nothing to say.
                let mut result = CommandResult::new(command);
                result.output = CommandOutput::new();
                result.output.exit_code = 0;
                Ok(result)
            }
        }
    }
}
