// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File read tool
//!
//! Reads contents of a file from the filesystem.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{required_str, truncate_chars, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

use super::resolve_path;

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 500;

/// Tool for reading file contents
pub struct FileReadTool {
    root: PathBuf,
}

impl FileReadTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for FileReadTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_read",
            "Read the contents of a file from the filesystem. Returns the file contents with line numbers.",
            SchemaBuilder::new()
                .string("path", "The path to the file to read (absolute or relative to working directory)", true)
                .integer("offset", "Line number to start reading from (1-indexed, default: 1)", false)
                .integer("limit", "Maximum number of lines to read (default: 2000)", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::ReadOnly
    }
}

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn call(&self, input: Value) -> Result<String> {
        let path = resolve_path(&self.root, required_str(&input, "path")?);
        let offset = input["offset"].as_u64().unwrap_or(1) as usize;
        let limit = input["limit"].as_u64().unwrap_or(DEFAULT_LIMIT as u64) as usize;

        if !path.is_file() {
            return Err(GalError::ToolExecution(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| GalError::ToolExecution(format!("Failed to read file: {}", e)))?;

        let lines: Vec<&str> = content.lines().collect();
        let start = offset.saturating_sub(1).min(lines.len());
        let end = start.saturating_add(limit).min(lines.len());

        let mut output = format!(
            "File: {} (lines {}-{} of {})\n",
            path.display(),
            start + 1,
            end,
            lines.len()
        );
        for (i, line) in lines[start..end].iter().enumerate() {
            output.push_str(&format!(
                "{:>6}\t{}\n",
                start + i + 1,
                truncate_chars(line, MAX_LINE_CHARS, "... (truncated)")
            ));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileReadTool) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let tool = FileReadTool::new(dir.path().to_path_buf());
        (dir, tool)
    }

    #[tokio::test]
    async fn test_read_whole_file() {
        let (_dir, tool) = setup();
        let output = tool.call(serde_json::json!({"path": "notes.txt"})).await.unwrap();
        assert!(output.contains("(lines 1-4 of 4)"));
        assert!(output.contains("     1\tone"));
        assert!(output.contains("     4\tfour"));
    }

    #[tokio::test]
    async fn test_read_window() {
        let (_dir, tool) = setup();
        let output = tool
            .call(serde_json::json!({"path": "notes.txt", "offset": 2, "limit": 2}))
            .await
            .unwrap();
        assert!(output.contains("(lines 2-3 of 4)"));
        assert!(output.contains("two"));
        assert!(!output.contains("four"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let (_dir, tool) = setup();
        let err = tool
            .call(serde_json::json!({"path": "absent.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[tokio::test]
    async fn test_path_required() {
        let (_dir, tool) = setup();
        assert!(matches!(
            tool.call(serde_json::json!({})).await,
            Err(GalError::InvalidInput(_))
        ));
    }
}
