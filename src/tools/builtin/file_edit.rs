// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File edit tool
//!
//! Replaces an inclusive range of lines with new content.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{required_str, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

use super::{format_diff, resolve_path};

/// Tool for line-range edits
pub struct FileEditTool {
    root: PathBuf,
}

impl FileEditTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for FileEditTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_edit",
            "Edit a file by replacing lines start_line through end_line (1-based, inclusive) with new content. Use file_read first to see line numbers.",
            SchemaBuilder::new()
                .string("path", "The path to the file to edit", true)
                .integer("start_line", "First line to replace (1-based)", true)
                .integer("end_line", "Last line to replace (inclusive)", true)
                .string("content", "Replacement text for the line range", true)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

fn required_line(input: &Value, key: &str) -> Result<usize> {
    match input.get(key).and_then(Value::as_i64) {
        Some(n) => Ok(usize::try_from(n).unwrap_or(0)),
        None => Err(GalError::InvalidInput(format!("{} is required", key))),
    }
}

#[async_trait]
impl ToolHandler for FileEditTool {
    async fn call(&self, input: Value) -> Result<String> {
        let path = resolve_path(&self.root, required_str(&input, "path")?);
        let start = required_line(&input, "start_line")?;
        let end = required_line(&input, "end_line")?;
        let replacement = required_str(&input, "content")?;

        if start < 1 || end < start {
            return Err(GalError::InvalidInput(format!(
                "invalid line range: {}-{}",
                start, end
            )));
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            GalError::ToolExecution(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let lines: Vec<&str> = content.split('\n').collect();
        if start > lines.len() {
            return Err(GalError::ToolExecution(format!(
                "start_line {} exceeds file length {}",
                start,
                lines.len()
            )));
        }
        let end = end.min(lines.len());

        let old_chunk = lines[start - 1..end].join("\n");
        let new_lines: Vec<&str> = replacement.split('\n').collect();
        let added = new_lines.len();
        let updated: Vec<&str> = lines[..start - 1]
            .iter()
            .chain(&new_lines)
            .chain(&lines[end..])
            .copied()
            .collect();

        tokio::fs::write(&path, updated.join("\n"))
            .await
            .map_err(|e| GalError::ToolExecution(format!("Failed to write file: {}", e)))?;

        Ok(format!(
            "edited {}: replaced lines {}-{} ({} lines) with {} lines\n{}",
            path.display(),
            start,
            end,
            end - start + 1,
            added,
            format_diff(start, &old_chunk, replacement)
        ))
    }
}
