// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Directory listing tool
//!
//! Lists files recursively, optionally filtered by a glob pattern.

use async_trait::async_trait;
use glob::Pattern;
use serde_json::Value;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{optional_str, ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

use super::{is_skipped_dir, resolve_path};

const DEFAULT_DEPTH: usize = 3;
const MAX_ENTRIES: usize = 500;

/// Tool for listing directory contents
pub struct FileListTool {
    root: PathBuf,
}

impl FileListTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for FileListTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "file_list",
            "List files under a directory recursively. Hidden directories are skipped. Optionally filter by a glob pattern such as '**/*.rs'.",
            SchemaBuilder::new()
                .string("path", "Directory to list (default: working directory)", false)
                .string("pattern", "Glob pattern matched against paths relative to the directory", false)
                .integer("depth", "Maximum depth to recurse (default: 3)", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::ReadOnly
    }
}

#[async_trait]
impl ToolHandler for FileListTool {
    async fn call(&self, input: Value) -> Result<String> {
        let base = optional_str(&input, "path")
            .map(|p| resolve_path(&self.root, p))
            .unwrap_or_else(|| self.root.clone());
        let depth = input["depth"]
            .as_u64()
            .filter(|d| *d > 0)
            .map_or(DEFAULT_DEPTH, |d| d as usize);
        let pattern = optional_str(&input, "pattern")
            .map(Pattern::new)
            .transpose()
            .map_err(|e| GalError::InvalidInput(format!("invalid glob pattern: {}", e)))?;

        if !base.is_dir() {
            return Err(GalError::ToolExecution(format!(
                "Not a directory: {}",
                base.display()
            )));
        }

        let walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir() && is_skipped_dir(&e.file_name().to_string_lossy()))
            });

        let mut entries = Vec::new();
        let mut truncated = false;
        for entry in walker.filter_map(|e| e.ok()) {
            let relative = entry.path().strip_prefix(&base).unwrap_or(entry.path());
            let relative = relative.to_string_lossy().replace('\\', "/");

            if let Some(ref pattern) = pattern {
                if entry.file_type().is_dir() || !pattern.matches(&relative) {
                    continue;
                }
            }

            if entries.len() >= MAX_ENTRIES {
                truncated = true;
                break;
            }
            if entry.file_type().is_dir() {
                entries.push(format!("{}/", relative));
            } else {
                entries.push(relative);
            }
        }

        if entries.is_empty() {
            return Ok(format!("{}: no matching entries", base.display()));
        }

        let mut output = format!("[{}: {} entries]\n", base.display(), entries.len());
        output.push_str(&entries.join("\n"));
        output.push('\n');
        if truncated {
            output.push_str("... (truncated)\n");
        }
        Ok(output)
    }
}
