// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in tools for gal

mod browser;
mod file_edit;
mod file_list;
mod file_patch;
mod file_read;
mod file_write;
mod grep;
mod http;
mod interactive;
mod shell;

pub use browser::{BrowserSession, BrowserTool};
pub use file_edit::FileEditTool;
pub use file_list::FileListTool;
pub use file_patch::FilePatchTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use grep::GrepTool;
pub use http::HttpTool;
pub use interactive::{InteractiveTool, INTERACTIVE_TOOL_NAME};
pub use shell::BashTool;

use std::path::{Path, PathBuf};

use crate::tools::ToolRegistry;

/// Register every builtin tool, resolving relative paths against `working_directory`.
///
/// Returns the shared browser session; the caller closes it on exit.
pub fn register_builtins(registry: &mut ToolRegistry, working_directory: &Path) -> BrowserSession {
    let root = working_directory.to_path_buf();
    let browser = BrowserSession::new();
    registry.register_tool(FileReadTool::new(root.clone()));
    registry.register_tool(FileListTool::new(root.clone()));
    registry.register_tool(GrepTool::new(root.clone()));
    registry.register_tool(HttpTool::new());
    registry.register_tool(FileWriteTool::new(root.clone()));
    registry.register_tool(FileEditTool::new(root.clone()));
    registry.register_tool(FilePatchTool::new(root.clone()));
    registry.register_tool(BashTool::new(root));
    registry.register_tool(BrowserTool::new(browser.clone()));
    registry.register_tool(InteractiveTool);
    browser
}

/// Resolve `path` against `root` unless it is already absolute.
fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        root.join(candidate)
    }
}

/// Render a replacement starting at `start_line` as a unified-style hunk.
fn format_diff(start_line: usize, old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut diff = format!(
        "@@ -{},{} +{},{} @@\n",
        start_line,
        old_lines.len(),
        start_line,
        new_lines.len()
    );
    for line in &old_lines {
        diff.push('-');
        diff.push_str(line);
        diff.push('\n');
    }
    for line in &new_lines {
        diff.push('+');
        diff.push_str(line);
        diff.push('\n');
    }
    diff
}

/// Directory names skipped by recursive walks
fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || matches!(name, "node_modules" | "__pycache__" | "target" | "vendor")
}
