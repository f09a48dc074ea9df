// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shell command tool
//!
//! Executes shell commands with a timeout. Commands that need a terminal are
//! refused up front because stdin is closed.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{required_str, truncate_chars, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_CHARS: usize = 30000;

const INTERACTIVE_COMMANDS: &[&str] = &["vim", "vi", "nano", "emacs", "top", "htop", "less", "more"];

/// Tool for executing shell commands
pub struct BashTool {
    working_directory: PathBuf,
    default_timeout: u64,
}

impl BashTool {
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            default_timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Override the default timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.default_timeout = secs;
        self
    }

    /// Return the interactive program `command` would launch, if any.
    fn interactive_program(command: &str) -> Option<&'static str> {
        let first = command.split_whitespace().next()?;
        INTERACTIVE_COMMANDS.iter().copied().find(|p| *p == first)
    }
}

impl Tool for BashTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "bash",
            "Execute a shell command and return its output. Commands run in the working directory with stdin closed and time out after 30 seconds by default. For editing files use file_write or file_edit instead of interactive editors.",
            SchemaBuilder::new()
                .string("command", "The shell command to execute", true)
                .integer("timeout", "Timeout in seconds (default: 30, max: 600)", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

#[async_trait]
impl ToolHandler for BashTool {
    async fn call(&self, input: Value) -> Result<String> {
        let command = required_str(&input, "command")?;
        let timeout_secs = input["timeout"]
            .as_u64()
            .filter(|t| *t > 0)
            .unwrap_or(self.default_timeout)
            .min(MAX_TIMEOUT_SECS);

        if let Some(program) = Self::interactive_program(command) {
            return Err(GalError::ToolExecution(format!(
                "interactive command '{}' is not supported; use file_write/file_edit for editing, or run it manually",
                program
            )));
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GalError::ToolExecution(format!("Failed to spawn command: {}", e)))?;

        // On timeout the child is dropped, which kills it.
        let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await
        {
            Ok(result) => result
                .map_err(|e| GalError::ToolExecution(format!("Failed to execute command: {}", e)))?,
            Err(_) => {
                tracing::debug!(target: "gal.tools.registry", command, timeout_secs, "shell command timed out");
                return Ok(format!("command timed out after {} seconds", timeout_secs));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = truncate_chars(&text, MAX_OUTPUT_CHARS, "\n... (output truncated)");

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Ok(format!("[exit {}]\n{}", code, text));
        }
        if text.is_empty() {
            return Ok("(no output)".to_string());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool(dir: &TempDir) -> BashTool {
        BashTool::new(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let output = tool(&dir)
            .call(serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code() {
        let dir = TempDir::new().unwrap();
        let output = tool(&dir)
            .call(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(output.starts_with("[exit 3]"));
        assert!(output.contains("oops"));
    }

    #[tokio::test]
    async fn test_empty_output() {
        let dir = TempDir::new().unwrap();
        let output = tool(&dir)
            .call(serde_json::json!({"command": "true"}))
            .await
            .unwrap();
        assert_eq!(output, "(no output)");
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_result() {
        let dir = TempDir::new().unwrap();
        let output = tool(&dir)
            .with_timeout(1)
            .call(serde_json::json!({"command": "sleep 5"}))
            .await
            .unwrap();
        assert_eq!(output, "command timed out after 1 seconds");
    }

    #[tokio::test]
    async fn test_interactive_editor_refused() {
        let dir = TempDir::new().unwrap();
        let err = tool(&dir)
            .call(serde_json::json!({"command": "vim notes.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("interactive command 'vim'"));
    }

    #[test]
    fn test_interactive_program_detection() {
        assert_eq!(BashTool::interactive_program("less file"), Some("less"));
        assert_eq!(BashTool::interactive_program("  top"), Some("top"));
        assert_eq!(BashTool::interactive_program("lesser"), None);
        assert_eq!(BashTool::interactive_program("echo vim"), None);
    }
}
