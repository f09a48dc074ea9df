// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic messages API provider implementation
//!
//! Tool calls are content blocks on the assistant message. Tool results are
//! `tool_result` blocks inside a `user` message, and consecutive results are
//! merged into one wire message to satisfy the API's turn-taking rule.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, GalError, Result};
use crate::llm::message::{model_id, Message, Role};
use crate::llm::provider::{ChatRequest, DeltaSink, LlmProvider, StreamDelta, ToolDefinition};
use crate::llm::stream::{pump, sse_data, BlockState, SseDecoder, ToolCallAccumulator};
use crate::llm::transport::RetryingTransport;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic provider
pub struct AnthropicProvider {
    transport: Arc<RetryingTransport>,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: impl Into<String>, transport: Arc<RetryingTransport>) -> Self {
        Self::with_base_url(api_key, ANTHROPIC_API_URL, transport)
    }

    /// Create with a custom base URL (the part before `/v1/messages`)
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        transport: Arc<RetryingTransport>,
    ) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| GalError::Config(format!("invalid API key header: {}", e)))?;
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    /// Convert canonical messages to the wire format.
    ///
    /// Returns the joined system prompt separately; the API takes it as a
    /// top-level field.
    fn convert_messages(&self, messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system: Vec<&str> = Vec::new();
        let mut converted: Vec<AnthropicMessage> = Vec::new();

        for m in messages {
            match m.role {
                Role::System => system.push(m.text_content()),
                Role::Assistant if m.has_tool_calls() => {
                    let mut blocks = Vec::with_capacity(m.tool_calls.len() + 1);
                    if !m.text_content().is_empty() {
                        blocks.push(AnthropicContentBlock::Text {
                            text: m.text_content().to_string(),
                        });
                    }
                    for tc in &m.tool_calls {
                        blocks.push(AnthropicContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: tc.arguments_json(),
                        });
                    }
                    converted.push(AnthropicMessage {
                        role: "assistant".to_string(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = AnthropicContentBlock::ToolResult {
                        tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                        content: vec![AnthropicTextBlock::new(m.text_content())],
                    };
                    if let Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(prev),
                    }) = converted.last_mut()
                    {
                        if role == "user" {
                            prev.push(block);
                            continue;
                        }
                    }
                    converted.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: AnthropicContent::Blocks(vec![block]),
                    });
                }
                Role::User | Role::Assistant => converted.push(AnthropicMessage {
                    role: m.role.as_str().to_string(),
                    content: AnthropicContent::Text(m.text_content().to_string()),
                }),
            }
        }

        let system = system
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let system = if system.is_empty() { None } else { Some(system) };
        (system, converted)
    }

    /// Convert tools to the wire format
    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &ChatRequest) -> AnthropicRequest {
        let (system, messages) = self.convert_messages(&request.messages);
        AnthropicRequest {
            model: model_id(&request.model).to_string(),
            messages,
            system,
            max_tokens: MAX_TOKENS,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(self.convert_tools(&request.tools))
            },
            stream: true,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_delta: &mut DeltaSink<'_>,
    ) -> Result<()> {
        let body = self.build_request(request);
        tracing::debug!(
            target: "gal.llm.anthropic",
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending messages request"
        );

        let mut reader = self
            .transport
            .post_stream(&self.endpoint(), self.headers()?, &body, cancel)
            .await?;
        let mut decoder = AnthropicStreamDecoder::new();
        let result = pump(&mut reader, &mut decoder, cancel, on_delta).await;

        tracing::debug!(
            target: "gal.llm.anthropic",
            events = decoder.events_seen(),
            ok = result.is_ok(),
            "stream finished"
        );
        result
    }
}

/// Decoder for messages-API SSE events.
///
/// Only `data:` lines are read; the event `type` inside the JSON drives the
/// block state machine.
pub struct AnthropicStreamDecoder {
    state: BlockState,
    tool_calls: ToolCallAccumulator,
    events: usize,
}

impl AnthropicStreamDecoder {
    pub fn new() -> Self {
        Self {
            state: BlockState::AwaitingEvent,
            tool_calls: ToolCallAccumulator::new(),
            events: 0,
        }
    }
}

impl Default for AnthropicStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder for AnthropicStreamDecoder {
    fn decode_line(&mut self, line: &str, on_delta: &mut DeltaSink<'_>) -> Result<()> {
        let Some(data) = sse_data(line) else {
            return Ok(());
        };
        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::trace!(target: "gal.llm.anthropic", error = %e, "skipping unparseable line");
                return Ok(());
            }
        };
        self.events += 1;

        let index = event["index"].as_u64().unwrap_or(0) as usize;

        match event["type"].as_str().unwrap_or_default() {
            "content_block_start" => {
                let block = &event["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => {
                        self.tool_calls
                            .open(index, block["id"].as_str(), block["name"].as_str());
                        self.state = BlockState::InToolBlock;
                    }
                    Some("text") => {
                        self.state = BlockState::InTextBlock;
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            on_delta(StreamDelta::Text(text.to_string()))?;
                        }
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                            on_delta(StreamDelta::Text(text.to_string()))?;
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(fragment) = delta["partial_json"].as_str() {
                            self.tool_calls.append(index, fragment);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(call) = self.tool_calls.finish(index) {
                    on_delta(StreamDelta::ToolCall(call))?;
                }
                self.state = BlockState::AwaitingEvent;
            }
            "message_stop" => {
                // A call without its block-stop is still complete at message end.
                for call in self.tool_calls.finish_all() {
                    on_delta(StreamDelta::ToolCall(call))?;
                }
                self.state = BlockState::Done;
                on_delta(StreamDelta::Done)?;
            }
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error")
                    .to_string();
                return Err(ApiError::StreamError(message).into());
            }
            _ => {}
        }

        Ok(())
    }

    fn state(&self) -> BlockState {
        self.state
    }

    fn events_seen(&self) -> usize {
        self.events
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<AnthropicTextBlock>,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTextBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
}

impl AnthropicTextBlock {
    fn new(text: &str) -> Self {
        Self {
            block_type: "text",
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}
