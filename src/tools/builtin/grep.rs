// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Grep/search tool
//!
//! Searches for regex matches in files.

use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{
    optional_str, required_str, truncate_chars, ConcurrencyClass, SchemaBuilder, Tool,
    ToolHandler,
};

use super::{is_skipped_dir, resolve_path};

const MAX_MATCHES: usize = 100;
const MAX_LINE_CHARS: usize = 300;

/// Tool for searching file contents
pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for GrepTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "grep",
            "Search for a regex pattern in files. Returns matching lines as path:line: text. Searches recursively.",
            SchemaBuilder::new()
                .string("pattern", "Regex pattern to search for", true)
                .string("path", "File or directory to search in (default: working directory)", false)
                .string("include", "Glob filter for file names (e.g. '*.rs')", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::ReadOnly
    }
}

#[async_trait]
impl ToolHandler for GrepTool {
    async fn call(&self, input: Value) -> Result<String> {
        let pattern_str = required_str(&input, "pattern")?;
        let base = optional_str(&input, "path")
            .map(|p| resolve_path(&self.root, p))
            .unwrap_or_else(|| self.root.clone());
        let include = optional_str(&input, "include")
            .map(Pattern::new)
            .transpose()
            .map_err(|e| GalError::InvalidInput(format!("invalid include glob: {}", e)))?;

        let regex = RegexBuilder::new(pattern_str)
            .build()
            .map_err(|e| GalError::InvalidInput(format!("invalid regex: {}", e)))?;

        if !base.exists() {
            return Err(GalError::ToolExecution(format!(
                "Path not found: {}",
                base.display()
            )));
        }

        let files: Vec<PathBuf> = if base.is_file() {
            vec![base.clone()]
        } else {
            WalkDir::new(&base)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !(e.file_type().is_dir()
                            && is_skipped_dir(&e.file_name().to_string_lossy()))
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect()
        };

        let mut matches = Vec::new();
        'files: for file in files {
            if let Some(ref include) = include {
                if !file_name_matches(&file, include) {
                    continue;
                }
            }
            // Binary and unreadable files are skipped.
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!(
                        "{}:{}: {}",
                        file.display(),
                        i + 1,
                        truncate_chars(line, MAX_LINE_CHARS, "...")
                    ));
                    if matches.len() >= MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!(
                "no matches for '{}' in {}",
                pattern_str,
                base.display()
            ));
        }

        let mut output = format!("[{} matches for '{}']\n", matches.len(), pattern_str);
        output.push_str(&matches.join("\n"));
        output.push('\n');
        if matches.len() >= MAX_MATCHES {
            output.push_str(&format!("... (truncated at {} matches)\n", MAX_MATCHES));
        }
        Ok(output)
    }
}

fn file_name_matches(path: &Path, include: &Pattern) -> bool {
    path.file_name()
        .map(|name| include.matches(&name.to_string_lossy()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GrepTool) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "alpha notes\n").unwrap();
        std::fs::write(dir.path().join(".hidden/x.rs"), "fn alpha() {}\n").unwrap();
        let tool = GrepTool::new(dir.path().to_path_buf());
        (dir, tool)
    }

    #[tokio::test]
    async fn test_regex_matches_with_line_numbers() {
        let (dir, tool) = setup();
        let output = tool
            .call(serde_json::json!({"pattern": "fn (alpha|beta)"}))
            .await
            .unwrap();
        let a_rs = dir.path().join("src/a.rs");
        assert!(output.contains(&format!("{}:1: fn alpha() {{}}", a_rs.display())));
        assert!(output.contains(&format!("{}:2: fn beta() {{}}", a_rs.display())));
        assert!(!output.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_include_filter() {
        let (_dir, tool) = setup();
        let output = tool
            .call(serde_json::json!({"pattern": "alpha", "include": "*.md"}))
            .await
            .unwrap();
        assert!(output.contains("notes.md:1: alpha notes"));
        assert!(!output.contains("a.rs"));
    }

    #[tokio::test]
    async fn test_no_matches() {
        let (_dir, tool) = setup();
        let output = tool
            .call(serde_json::json!({"pattern": "gamma"}))
            .await
            .unwrap();
        assert!(output.starts_with("no matches"));
    }

    #[tokio::test]
    async fn test_invalid_regex() {
        let (_dir, tool) = setup();
        assert!(matches!(
            tool.call(serde_json::json!({"pattern": "("})).await,
            Err(GalError::InvalidInput(_))
        ));
    }
}
