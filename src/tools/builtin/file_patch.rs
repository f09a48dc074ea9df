// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File patch tool
//!
//! Edits existing files by replacing one unique string.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{required_str, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

use super::{format_diff, resolve_path};

/// Tool for string-replacement edits
pub struct FilePatchTool {
    root: PathBuf,
}

impl FilePatchTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for FilePatchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_patch",
            "Edit a file by replacing an exact string match. More precise than file_edit (line-based). The old_str must match exactly (including whitespace and indentation) and must be unique in the file. Use file_read first to see the exact content.",
            SchemaBuilder::new()
                .string("path", "The path to the file to edit", true)
                .string("old_str", "The exact string to find and replace (must be unique in the file)", true)
                .string("new_str", "The string to replace it with", true)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

#[async_trait]
impl ToolHandler for FilePatchTool {
    async fn call(&self, input: Value) -> Result<String> {
        let path = resolve_path(&self.root, required_str(&input, "path")?);
        let old_str = required_str(&input, "old_str")?;
        let new_str = required_str(&input, "new_str")?;

        if old_str.is_empty() {
            return Err(GalError::InvalidInput("old_str must not be empty".to_string()));
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            GalError::ToolExecution(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let offsets: Vec<usize> = content.match_indices(old_str).map(|(i, _)| i).collect();
        let offset = match offsets.as_slice() {
            [] => {
                return Err(GalError::ToolExecution(format!(
                    "String not found in {}. Make sure old_str matches exactly (including whitespace).",
                    path.display()
                )))
            }
            [offset] => *offset,
            all => {
                return Err(GalError::ToolExecution(format!(
                    "Found {} occurrences of old_str in {}. Provide a more specific string.",
                    all.len(),
                    path.display()
                )))
            }
        };

        let new_content = format!(
            "{}{}{}",
            &content[..offset],
            new_str,
            &content[offset + old_str.len()..]
        );
        tokio::fs::write(&path, &new_content)
            .await
            .map_err(|e| GalError::ToolExecution(format!("Failed to write file: {}", e)))?;

        let start_line = content[..offset].matches('\n').count() + 1;
        Ok(format!(
            "patched {}\n{}",
            path.display(),
            format_diff(start_line, old_str, new_str)
        ))
    }
}
