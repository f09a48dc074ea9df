// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI chat-completions provider implementation
//!
//! Works with any OpenAI-compatible endpoint. Tool calls travel as a flat
//! array on the assistant message and tool results as independent `tool`
//! messages.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, GalError, Result};
use crate::llm::message::{model_id, Message, Role};
use crate::llm::provider::{ChatRequest, DeltaSink, LlmProvider, StreamDelta, ToolDefinition};
use crate::llm::stream::{pump, sse_data, BlockState, SseDecoder, ToolCallAccumulator};
use crate::llm::transport::RetryingTransport;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    transport: Arc<RetryingTransport>,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new provider against the public endpoint
    pub fn new(api_key: impl Into<String>, transport: Arc<RetryingTransport>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL, transport)
    }

    /// Create with a custom base URL (the part before `/chat/completions`)
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
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Request headers; `Authorization` is omitted for keyless endpoints.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| GalError::Config(format!("invalid API key header: {}", e)))?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    /// Convert canonical messages to the wire format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| {
                let content = match (&m.content, m.role) {
                    (Some(text), Role::Assistant | Role::Tool) if text.is_empty() => None,
                    (None, Role::Assistant | Role::Tool) => None,
                    (content, _) => Some(content.clone().unwrap_or_default()),
                };

                let tool_calls = if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| OpenAiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                OpenAiMessage {
                    role: m.role.as_str().to_string(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.clone(),
                }
            })
            .collect()
    }

    /// Convert tools to the wire format
    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &ChatRequest) -> OpenAiRequest {
        OpenAiRequest {
            model: model_id(&request.model).to_string(),
            messages: self.convert_messages(&request.messages),
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
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_delta: &mut DeltaSink<'_>,
    ) -> Result<()> {
        let body = self.build_request(request);
        tracing::debug!(
            target: "gal.llm.openai",
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "sending chat completion request"
        );

        let mut reader = self
            .transport
            .post_stream(&self.endpoint(), self.headers()?, &body, cancel)
            .await?;
        let mut decoder = OpenAiStreamDecoder::new();
        let result = pump(&mut reader, &mut decoder, cancel, on_delta).await;

        tracing::debug!(
            target: "gal.llm.openai",
            events = decoder.events_seen(),
            ok = result.is_ok(),
            "stream finished"
        );
        result
    }
}

/// Decoder for chat-completions SSE lines.
///
/// The protocol has no per-call stop event, so open tool calls are closed in
/// index order at `[DONE]`. `finish_reason` is ignored: some compatible
/// servers repeat it on every chunk or keep streaming arguments after it.
pub struct OpenAiStreamDecoder {
    state: BlockState,
    tool_calls: ToolCallAccumulator,
    events: usize,
}

impl OpenAiStreamDecoder {
    pub fn new() -> Self {
        Self {
            state: BlockState::AwaitingEvent,
            tool_calls: ToolCallAccumulator::new(),
            events: 0,
        }
    }

    fn close_tool_calls(&mut self, on_delta: &mut DeltaSink<'_>) -> Result<()> {
        for call in self.tool_calls.finish_all() {
            on_delta(StreamDelta::ToolCall(call))?;
        }
        self.state = BlockState::AwaitingEvent;
        Ok(())
    }
}

impl Default for OpenAiStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder for OpenAiStreamDecoder {
    fn decode_line(&mut self, line: &str, on_delta: &mut DeltaSink<'_>) -> Result<()> {
        let Some(data) = sse_data(line) else {
            return Ok(());
        };

        if data == "[DONE]" {
            self.close_tool_calls(on_delta)?;
            self.state = BlockState::Done;
            return on_delta(StreamDelta::Done);
        }

        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::trace!(target: "gal.llm.openai", error = %e, "skipping unparseable line");
                return Ok(());
            }
        };
        self.events += 1;

        if let Some(error) = chunk.error {
            return Err(ApiError::StreamError(error.message).into());
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            self.state = BlockState::InTextBlock;
            on_delta(StreamDelta::Text(text))?;
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let index = tc.index.unwrap_or(0);
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            self.tool_calls
                .open(index, tc.id.as_deref(), name.as_deref());
            if let Some(fragment) = arguments {
                self.tool_calls.append(index, &fragment);
            }
            self.state = BlockState::InToolBlock;
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

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    #[serde(default)]
    message: String,
}
