// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The agentic turn loop.
//!
//! One call to [`Engine::send`] is one user turn: the model is invoked, any
//! tool calls it requests are executed and fed back, and the loop repeats until
//! the model answers with plain text. A failed turn leaves the transcript
//! exactly as it was before the user message was appended.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::chat::interactive::{parse_interactive_fields, FieldRequest, InteractiveInput};
use crate::chat::mask::{mask_secrets, register_secret, MASK};
use crate::context::{self, Compressor};
use crate::error::{GalError, Result};
use crate::llm::message::{Message, Role, ToolCall};
use crate::llm::provider::{ChatRequest, LlmProvider, StreamDelta};
use crate::tools::builtin::INTERACTIVE_TOOL_NAME;
use crate::tools::{truncate_chars, ToolRegistry};

pub const DEFAULT_MAX_ROUNDS: u32 = 50;
pub const DEFAULT_CONTEXT_LIMIT: usize = 60000;
const PREVIEW_CHARS: usize = 200;

/// Static configuration for an [`Engine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Content of the leading system message
    pub system_prompt: String,
    /// Model invocations allowed per turn
    pub max_rounds: u32,
    /// Estimated token budget; zero disables compression
    pub context_limit: usize,
    /// Registry tools offered to the model; empty means non-tool mode
    pub tool_names: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            tool_names: Vec::new(),
        }
    }
}

/// How the last turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Success,
    Failed,
}

/// Where the engine is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingModel,
    AwaitingToolResults,
    AwaitingInteractiveInput,
    Terminated(TurnOutcome),
}

/// Output hooks for a turn.
///
/// Frontends implement this to render streamed text and tool activity.
/// Returning an error from a hook aborts the turn.
pub trait TurnObserver: Send {
    fn on_text_delta(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn on_tool_call(&mut self, _call: &ToolCall) -> Result<()> {
        Ok(())
    }

    /// `preview` is masked and cut to 200 characters.
    fn on_tool_result(&mut self, _name: &str, _preview: &str, _elapsed: Duration) -> Result<()> {
        Ok(())
    }

    /// Called after the transcript was compressed; `folded` messages were summarized.
    fn on_compression(&mut self, _folded: usize) -> Result<()> {
        Ok(())
    }

    fn on_compression_failed(&mut self, _error: &GalError) -> Result<()> {
        Ok(())
    }
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default)]
pub struct NoopTurnObserver;

impl TurnObserver for NoopTurnObserver {}

/// Result of one tool call, before it is appended
struct CallOutcome {
    content: String,
    display: String,
    elapsed: Duration,
}

/// Interactive call selected for this round
struct InteractiveCall {
    index: usize,
    fields: Vec<FieldRequest>,
}

/// Conversation state plus the collaborators needed to advance it
pub struct Engine {
    provider: Arc<dyn LlmProvider>,
    model: String,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    messages: Vec<Message>,
    state: EngineState,
    interactive: Option<Arc<dyn InteractiveInput>>,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
    ) -> Self {
        let messages = vec![Message::system(config.system_prompt.clone())];
        Self {
            provider,
            model: model.into(),
            registry,
            config,
            messages,
            state: EngineState::Idle,
            interactive: None,
        }
    }

    /// Attach the collaborator that answers interactive tool calls
    pub fn set_interactive(&mut self, input: Arc<dyn InteractiveInput>) {
        self.interactive = Some(input);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current model reference, `provider/model`
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Use another model on the same provider. The transcript is kept.
    pub fn switch_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        tracing::info!(target: "gal.chat.engine", model = %self.model, "model switched");
    }

    /// Replace the provider and model. The transcript is kept.
    pub fn switch_provider(&mut self, provider: Arc<dyn LlmProvider>, model: impl Into<String>) {
        self.provider = provider;
        self.model = model.into();
        tracing::info!(
            target: "gal.chat.engine",
            provider = self.provider.name(),
            model = %self.model,
            "provider switched"
        );
    }

    /// Reset the transcript to the system message
    pub fn clear(&mut self) {
        self.messages = vec![Message::system(self.config.system_prompt.clone())];
        self.state = EngineState::Idle;
        tracing::debug!(target: "gal.chat.engine", "transcript cleared");
    }

    pub fn needs_compression(&self) -> bool {
        context::needs_compression(&self.messages, self.config.context_limit)
    }

    /// Summarize the oldest part of the transcript with the current model.
    ///
    /// Returns the number of messages folded into the summary.
    pub async fn compress(&mut self, cancel: &CancellationToken) -> Result<usize> {
        Compressor::new(self.provider.as_ref(), &self.model, self.config.context_limit)
            .compress(&mut self.messages, cancel)
            .await
    }

    /// Run one user turn.
    ///
    /// On error the transcript is restored to its state before `input` was
    /// appended. Compression after a successful turn never fails the turn.
    pub async fn send(
        &mut self,
        input: &str,
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.drop_incomplete_tool_calls();

        let snapshot = self.messages.len();
        self.messages.push(Message::user(input));

        tracing::info!(
            target: "gal.chat.engine",
            model = %self.model,
            messages = self.messages.len(),
            "turn start"
        );

        if let Err(error) = self.run_turn(observer, cancel).await {
            self.messages.truncate(snapshot);
            self.state = EngineState::Terminated(TurnOutcome::Failed);
            tracing::warn!(
                target: "gal.chat.engine",
                error = %mask_secrets(&error.to_string()),
                restored_messages = snapshot,
                "turn failed, transcript rolled back"
            );
            return Err(error);
        }

        self.state = EngineState::Terminated(TurnOutcome::Success);
        tracing::info!(
            target: "gal.chat.engine",
            messages = self.messages.len(),
            "turn complete"
        );

        if self.needs_compression() {
            // The turn is already committed; nothing past this point may fail it.
            let notified = match self.compress(cancel).await {
                Ok(0) => Ok(()),
                Ok(folded) => observer.on_compression(folded),
                Err(error) => {
                    tracing::warn!(
                        target: "gal.chat.engine",
                        error = %mask_secrets(&error.to_string()),
                        "context compression failed"
                    );
                    observer.on_compression_failed(&error)
                }
            };
            if let Err(error) = notified {
                tracing::warn!(
                    target: "gal.chat.engine",
                    error = %mask_secrets(&error.to_string()),
                    "compression observer failed"
                );
            }
        }

        Ok(())
    }

    async fn run_turn(
        &mut self,
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(GalError::Cancelled);
            }

            self.state = EngineState::AwaitingModel;
            let (text, calls) = self.stream_round(round, observer, cancel).await?;

            if calls.is_empty() {
                if text.is_empty() {
                    return Err(GalError::EmptyResponse { round });
                }
                tracing::debug!(
                    target: "gal.chat.engine",
                    round,
                    chars = text.chars().count(),
                    "text response"
                );
                self.messages.push(Message::assistant(text));
                return Ok(());
            }

            tracing::debug!(
                target: "gal.chat.engine",
                round,
                tool_calls = calls.len(),
                "tool call response"
            );
            self.messages
                .push(Message::assistant_tool_calls(text, calls.clone()));

            if cancel.is_cancelled() {
                return Err(GalError::Cancelled);
            }

            let outcomes = self.execute_calls(&calls, observer, cancel).await?;
            for (call, outcome) in calls.iter().zip(outcomes) {
                tracing::debug!(
                    target: "gal.chat.engine",
                    tool = %call.name,
                    chars = outcome.content.chars().count(),
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    result = %outcome.display,
                    "tool result"
                );
                let preview = truncate_chars(&outcome.display, PREVIEW_CHARS, "...");
                observer.on_tool_result(&call.name, &preview, outcome.elapsed)?;
                self.messages
                    .push(Message::tool_result(call.id.clone(), outcome.content));
            }
        }

        Err(GalError::RoundLimitExceeded(self.config.max_rounds))
    }

    /// Invoke the model once, returning accumulated text and complete tool calls
    async fn stream_round(
        &self,
        round: u32,
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<ToolCall>)> {
        let tools = if self.config.tool_names.is_empty() {
            Vec::new()
        } else {
            self.registry.definitions(&self.config.tool_names)
        };
        let request = ChatRequest::new(self.model.clone(), self.messages.clone()).with_tools(tools);

        if tracing::enabled!(target: "gal.chat.engine", tracing::Level::DEBUG) {
            let payload = serde_json::json!({
                "model": request.model,
                "messages": request.messages,
                "tools": request.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            });
            tracing::debug!(
                target: "gal.chat.engine",
                round,
                request = %mask_secrets(&payload.to_string()),
                "model request"
            );
        }

        let mut text = String::new();
        let mut calls = Vec::new();
        self.provider
            .chat_stream(&request, cancel, &mut |delta| {
                match delta {
                    StreamDelta::Text(fragment) => {
                        observer.on_text_delta(&fragment)?;
                        text.push_str(&fragment);
                    }
                    StreamDelta::ToolCall(call) => calls.push(call),
                    StreamDelta::Done => {}
                }
                Ok(())
            })
            .await?;

        Ok((text, calls))
    }

    /// Execute one round of tool calls, returning outcomes in call order
    async fn execute_calls(
        &mut self,
        calls: &[ToolCall],
        observer: &mut dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<Vec<CallOutcome>> {
        let interactive = first_interactive_call(calls);

        let mut collected: Option<(BTreeMap<String, String>, Vec<String>)> = None;
        if let (Some(selected), Some(input)) = (&interactive, self.interactive.clone()) {
            if !selected.fields.is_empty() {
                self.state = EngineState::AwaitingInteractiveInput;
                tracing::debug!(
                    target: "gal.chat.engine",
                    fields = selected.fields.len(),
                    "collecting interactive input"
                );
                let values = tokio::select! {
                    _ = cancel.cancelled() => return Err(GalError::Cancelled),
                    values = input.collect(&selected.fields) => values?,
                };

                let sensitive: Vec<String> = selected
                    .fields
                    .iter()
                    .filter(|f| f.sensitive)
                    .map(|f| f.name.clone())
                    .collect();
                for name in &sensitive {
                    if let Some(value) = values.get(name) {
                        register_secret(value.clone());
                    }
                }
                collected = Some((values, sensitive));
            }
        }

        self.state = EngineState::AwaitingToolResults;

        let parallel = interactive.is_none()
            && calls.len() > 1
            && calls.iter().all(|c| self.registry.is_read_only(&c.name));

        if parallel {
            tracing::debug!(
                target: "gal.chat.engine",
                tool_calls = calls.len(),
                "executing read-only batch in parallel"
            );
            for call in calls {
                observer.on_tool_call(call)?;
            }
            let registry = self.registry.as_ref();
            let outcomes = join_all(calls.iter().map(|call| run_tool(registry, call))).await;
            return Ok(outcomes
                .into_iter()
                .map(masked)
                .collect());
        }

        let mut outcomes = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            observer.on_tool_call(call)?;

            let answered = interactive
                .as_ref()
                .filter(|selected| selected.index == index)
                .and(collected.as_ref());

            let outcome = match answered {
                Some((values, sensitive)) => {
                    let content = serde_json::to_string(values)?;
                    let mut shown = values.clone();
                    for name in sensitive {
                        if let Some(value) = shown.get_mut(name) {
                            *value = MASK.to_string();
                        }
                    }
                    CallOutcome {
                        content,
                        display: serde_json::to_string(&shown)?,
                        elapsed: Duration::ZERO,
                    }
                }
                None => run_tool(&self.registry, call).await,
            };
            outcomes.push(masked(outcome));
        }
        Ok(outcomes)
    }

    /// Strip trailing tool exchanges left behind by an interrupted turn.
    fn drop_incomplete_tool_calls(&mut self) {
        let before = self.messages.len();
        while let Some(last) = self.messages.last() {
            let incomplete = last.role == Role::Tool
                || (last.role == Role::Assistant && last.has_tool_calls());
            if !incomplete {
                break;
            }
            self.messages.pop();
        }
        if self.messages.len() < before {
            tracing::debug!(
                target: "gal.chat.engine",
                removed = before - self.messages.len(),
                "dropped incomplete tool exchange"
            );
        }
    }
}

/// The first interactive call with a parseable `fields` array.
///
/// Later interactive calls in the same round run through the registry.
fn first_interactive_call(calls: &[ToolCall]) -> Option<InteractiveCall> {
    calls.iter().enumerate().find_map(|(index, call)| {
        if call.name != INTERACTIVE_TOOL_NAME {
            return None;
        }
        parse_interactive_fields(&call.arguments_json()).map(|fields| InteractiveCall { index, fields })
    })
}

fn masked(mut outcome: CallOutcome) -> CallOutcome {
    outcome.display = mask_secrets(&outcome.display);
    outcome
}

async fn run_tool(registry: &ToolRegistry, call: &ToolCall) -> CallOutcome {
    let start = Instant::now();
    let content = match registry.execute(&call.name, &call.arguments).await {
        Ok(output) => output,
        Err(error) => format!("error: {}", error),
    };
    CallOutcome {
        display: content.clone(),
        content,
        elapsed: start.elapsed(),
    }
}
