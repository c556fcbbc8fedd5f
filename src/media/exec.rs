//! One-shot external program execution with a testable seam.
//!
//! The prober and the reverse encoder run short-lived programs and only care
//! about their stdout. The `CommandExecutor` trait lets tests replace them.

use crate::error::{DictapiError, Result};
use std::process::Command;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync so adapters holding one can be shared.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the stdout of the command on success.
    /// Returns an error if the command fails or is not found.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command)
            .args(args)
            .output()
            .map_err(|e| spawn_error(command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DictapiError::ToolFailed {
                message: format!(
                    "{} failed with status {:?}: {}",
                    command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Maps a failure to start `command` onto the error taxonomy.
pub(crate) fn spawn_error(command: &str, e: std::io::Error) -> DictapiError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DictapiError::ToolNotFound {
            tool: command.to_string(),
        }
    } else {
        DictapiError::ToolFailed {
            message: format!("Failed to execute {}: {}", command, e),
        }
    }
}

/// True when `program` can be started from the current PATH.
pub fn is_available(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_not_found() {
        let executor = SystemCommandExecutor::new();
        let err = executor
            .execute("dictapi-definitely-not-a-program", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            DictapiError::ToolNotFound { tool } if tool == "dictapi-definitely-not-a-program"
        ));
    }

    #[test]
    fn test_successful_command_returns_stdout() {
        let executor = SystemCommandExecutor::new();
        let out = executor.execute("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_failing_command_is_tool_failed() {
        let executor = SystemCommandExecutor::new();
        let err = executor.execute("false", &[]).unwrap_err();
        assert!(matches!(err, DictapiError::ToolFailed { .. }));
    }
}
