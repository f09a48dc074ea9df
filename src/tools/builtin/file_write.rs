// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File write tool
//!
//! Creates or overwrites files.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{required_str, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

use super::resolve_path;

/// Tool for writing file contents
pub struct FileWriteTool {
    root: PathBuf,
}

impl FileWriteTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for FileWriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_write",
            "Write content to a file, creating it and any parent directories if needed. Overwrites existing content.",
            SchemaBuilder::new()
                .string("path", "The path to the file to write", true)
                .string("content", "The content to write", true)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

#[async_trait]
impl ToolHandler for FileWriteTool {
    async fn call(&self, input: Value) -> Result<String> {
        let path = resolve_path(&self.root, required_str(&input, "path")?);
        let content = required_str(&input, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GalError::ToolExecution(format!("Failed to create directories: {}", e))
            })?;
        }

        let existed = path.exists();
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| GalError::ToolExecution(format!("Failed to write file: {}", e)))?;

        Ok(format!(
            "{} {} ({} lines, {} bytes)",
            if existed { "wrote" } else { "created" },
            path.display(),
            content.lines().count(),
            content.len()
        ))
    }
}
