// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM provider trait and the canonical streaming contract
//!
//! Every vendor adapter implements [`LlmProvider`]: it takes a canonical
//! transcript plus tool definitions and delivers [`StreamDelta`] events, in
//! vendor emission order, to a caller-supplied sink. A successful call always
//! ends with exactly one [`StreamDelta::Done`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::message::{Message, ToolCall};

/// Callback receiving deltas as they are decoded.
///
/// Returning an error aborts the stream and propagates the error to the caller.
pub type DeltaSink<'a> = dyn FnMut(StreamDelta) -> Result<()> + Send + 'a;

/// Request sent to a provider for one model invocation
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model reference, optionally prefixed with `provider/`
    pub model: String,
    /// Canonical transcript, including leading system messages
    pub messages: Vec<Message>,
    /// Tool definitions; empty means non-tool mode
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    /// Create a new request with no tools
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
        }
    }

    /// Attach tool definitions
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Definition of a tool exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool arguments
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One canonical streaming event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// A fragment of assistant text
    Text(String),
    /// A tool call whose argument fragments have all arrived
    ToolCall(ToolCall),
    /// Completion marker; nothing follows it
    Done,
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Stream one model invocation into `on_delta`.
    ///
    /// Cancelling `cancel` aborts the in-flight request with
    /// [`GalError::Cancelled`](crate::error::GalError::Cancelled).
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_delta: &mut DeltaSink<'_>,
    ) -> Result<()>;
}


impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider").field("name", &self.name()).finish()
    }
}
