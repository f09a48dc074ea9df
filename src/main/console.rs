// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Terminal output and stdin-backed interactive input

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use gal::chat::{mask_secrets, FieldKind, FieldRequest, InteractiveInput, TurnObserver};
use gal::error::{GalError, Result};
use gal::llm::ToolCall;

/// Stdin lines shared by the REPL and interactive prompts
pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Read one line; `None` at end of input.
pub async fn read_line(lines: &SharedLines) -> Result<Option<String>> {
    Ok(lines.lock().await.next_line().await?)
}

pub fn prompt(text: &str) -> Result<()> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", text)?;
    stderr.flush()?;
    Ok(())
}

/// Renders a turn: streamed text on stdout, tool activity on stderr
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    mid_line: bool,
}

impl ConsoleObserver {
    /// Terminate a partially printed line
    pub fn finish(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_text_delta(&mut self, text: &str) -> Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", text)?;
        stdout.flush()?;
        self.mid_line = !text.ends_with('\n');
        Ok(())
    }

    fn on_tool_call(&mut self, call: &ToolCall) -> Result<()> {
        self.finish();
        eprintln!("  → {}", call.name);
        Ok(())
    }

    fn on_tool_result(&mut self, name: &str, preview: &str, elapsed: Duration) -> Result<()> {
        eprintln!(
            "  ✔ {} → {} ({:.1}s)",
            name,
            preview.replace('\n', " "),
            elapsed.as_secs_f64()
        );
        Ok(())
    }

    fn on_compression(&mut self, folded: usize) -> Result<()> {
        self.finish();
        eprintln!("  [context compressed: {} messages summarized]", folded);
        Ok(())
    }

    fn on_compression_failed(&mut self, error: &GalError) -> Result<()> {
        self.finish();
        eprintln!(
            "  [context compression failed: {}]",
            mask_secrets(&error.to_string())
        );
        Ok(())
    }
}

/// Collects interactive field values from stdin
pub struct StdinInput {
    lines: SharedLines,
}

impl StdinInput {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }

    async fn answer(&self) -> Result<String> {
        read_line(&self.lines)
            .await?
            .ok_or_else(|| GalError::Interactive("input closed".to_string()))
    }
}

#[async_trait]
impl InteractiveInput for StdinInput {
    async fn collect(&self, fields: &[FieldRequest]) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for field in fields {
            let value = if field.kind == FieldKind::Choice && !field.options.is_empty() {
                eprintln!("{}", field.hint);
                for (i, option) in field.options.iter().enumerate() {
                    eprintln!("  {}) {}", i + 1, option);
                }
                loop {
                    prompt("> ")?;
                    let answer = self.answer().await?;
                    match field.resolve_choice(&answer) {
                        Some(choice) => break choice,
                        None => eprintln!("choose 1-{} or type an option", field.options.len()),
                    }
                }
            } else {
                prompt(&format!("{}: ", field.hint))?;
                self.answer().await?.trim_end().to_string()
            };
            values.insert(field.name.clone(), value);
        }
        Ok(values)
    }
}
