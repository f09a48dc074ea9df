// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Transcript compression
//!
//! When the estimated token count passes the context limit, the oldest part of
//! the transcript is replaced by a model-written summary. The leading system
//! message always survives, and an assistant tool-call message is never
//! separated from the tool results that answer it.

use tokio_util::sync::CancellationToken;

use crate::error::{GalError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{ChatRequest, LlmProvider, StreamDelta};
use crate::tools::truncate_chars;

const CHARS_PER_TOKEN: f64 = 2.5;
const TARGET_RATIO: f64 = 0.8;
const TOOL_RESULT_PREVIEW_CHARS: usize = 500;

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation concisely, preserving key decisions, code changes, file paths, and technical details. Output in the same language as the conversation.";
const SUMMARY_PREFIX: &str = "[Compressed context from earlier conversation]\n";

fn message_chars(message: &Message) -> usize {
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| tc.name.chars().count() + tc.arguments.chars().count())
        .sum();
    message.text_content().chars().count() + calls
}

fn chars_to_tokens(chars: usize) -> usize {
    (chars as f64 / CHARS_PER_TOKEN) as usize
}

/// Rough token estimate: characters / 2.5
pub fn estimate_tokens(messages: &[Message]) -> usize {
    chars_to_tokens(messages.iter().map(message_chars).sum())
}

/// True when compression is enabled and the estimate exceeds `limit`
pub fn needs_compression(messages: &[Message], limit: usize) -> bool {
    limit > 0 && estimate_tokens(messages) > limit
}

/// Number of messages after the leading system message that fit into 80% of
/// `limit`, extended so that tool-call groups are never split.
///
/// Zero means nothing can be compressed.
pub fn find_boundary(messages: &[Message], limit: usize) -> usize {
    let Some(history) = messages.get(1..) else {
        return 0;
    };
    let target = (limit as f64 * TARGET_RATIO) as usize;

    let mut accumulated = 0;
    let mut cut = 0;
    while cut < history.len() {
        let message = &history[cut];
        let tokens = chars_to_tokens(message_chars(message));
        if accumulated + tokens > target {
            break;
        }
        accumulated += tokens;
        cut += 1;

        if message.role == Role::Assistant && message.has_tool_calls() {
            while cut < history.len() && history[cut].role == Role::Tool {
                accumulated += chars_to_tokens(message_chars(&history[cut]));
                cut += 1;
            }
        }
    }
    cut
}

/// Render messages as labelled paragraphs for the summary request
pub fn flatten(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        match message.role {
            Role::User => {
                out.push_str("User: ");
                out.push_str(message.text_content());
                out.push_str("\n\n");
            }
            Role::Assistant => {
                if !message.text_content().is_empty() {
                    out.push_str("Assistant: ");
                    out.push_str(message.text_content());
                    out.push_str("\n\n");
                }
                if message.has_tool_calls() {
                    for call in &message.tool_calls {
                        out.push_str(&format!(
                            "Assistant called tool {}({})\n",
                            call.name, call.arguments
                        ));
                    }
                    out.push('\n');
                }
            }
            Role::Tool => {
                out.push_str("Tool result: ");
                out.push_str(&truncate_chars(
                    message.text_content(),
                    TOOL_RESULT_PREVIEW_CHARS,
                    "...(truncated)",
                ));
                out.push_str("\n\n");
            }
            Role::System => {}
        }
    }
    out
}

/// Summarizes the head of a transcript through a provider
pub struct Compressor<'a> {
    provider: &'a dyn LlmProvider,
    model: &'a str,
    limit: usize,
}

impl<'a> Compressor<'a> {
    pub fn new(provider: &'a dyn LlmProvider, model: &'a str, limit: usize) -> Self {
        Self {
            provider,
            model,
            limit,
        }
    }

    /// Compress `messages` in place.
    ///
    /// Returns the number of messages folded into the summary; zero when
    /// compression is not needed or nothing fits. On failure the transcript
    /// is left untouched.
    pub async fn compress(
        &self,
        messages: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if !needs_compression(messages, self.limit) {
            return Ok(0);
        }

        let cut = find_boundary(messages, self.limit);
        if cut == 0 {
            tracing::debug!(
                target: "gal.context.compressor",
                limit = self.limit,
                "no compressible prefix fits the target"
            );
            return Ok(0);
        }

        let zone = &messages[1..=cut];
        let request = ChatRequest::new(
            self.model,
            vec![Message::system(SUMMARY_INSTRUCTION), Message::user(flatten(zone))],
        );

        tracing::debug!(
            target: "gal.context.compressor",
            zone = zone.len(),
            keep = messages.len() - 1 - cut,
            zone_tokens = estimate_tokens(zone),
            "compressing transcript"
        );

        let mut summary = String::new();
        self.provider
            .chat_stream(&request, cancel, &mut |delta| {
                if let StreamDelta::Text(text) = delta {
                    summary.push_str(&text);
                }
                Ok(())
            })
            .await
            .map_err(|e| match e {
                GalError::Cancelled => GalError::Cancelled,
                other => GalError::Compression(other.to_string()),
            })?;

        if summary.trim().is_empty() {
            return Err(GalError::Compression("model returned an empty summary".to_string()));
        }

        let summary_message = Message::system(format!("{}{}", SUMMARY_PREFIX, summary));
        messages.splice(1..=cut, std::iter::once(summary_message));

        tracing::info!(
            target: "gal.context.compressor",
            folded = cut,
            summary_chars = summary.chars().count(),
            remaining = messages.len(),
            "transcript compressed"
        );
        Ok(cut)
    }
}
