// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Replays scripted rounds through the [`LlmProvider`] streaming contract so
//! engine behavior can be tested without making real API calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, GalError, Result};
use crate::llm::message::ToolCall;
use crate::llm::provider::{ChatRequest, DeltaSink, LlmProvider, StreamDelta};

/// One scripted model invocation
#[derive(Debug, Clone, Default)]
pub struct MockRound {
    /// Deltas delivered in order
    pub deltas: Vec<StreamDelta>,
    /// Stream error raised after the deltas, if any
    pub failure: Option<String>,
    /// Wait before streaming (cancellable)
    pub delay: Option<Duration>,
}

impl MockRound {
    /// A round answering with plain text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            deltas: vec![StreamDelta::Text(text.into()), StreamDelta::Done],
            ..Default::default()
        }
    }

    /// A round requesting tool calls
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        let mut deltas: Vec<StreamDelta> = calls.into_iter().map(StreamDelta::ToolCall).collect();
        deltas.push(StreamDelta::Done);
        Self {
            deltas,
            ..Default::default()
        }
    }

    /// A round completing with no content at all
    pub fn empty() -> Self {
        Self {
            deltas: vec![StreamDelta::Done],
            ..Default::default()
        }
    }

    /// A round failing with a stream error before any delta
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Stream `text` and then fail without a completion marker
    pub fn partial_then_fail(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            deltas: vec![StreamDelta::Text(text.into())],
            failure: Some(message.into()),
            delay: None,
        }
    }

    /// Delay the round
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A mock LLM provider for testing
#[derive(Clone, Default)]
pub struct MockProvider {
    /// Scripted rounds, consumed front to back
    rounds: Arc<Mutex<VecDeque<MockRound>>>,
    /// Round replayed once the script is exhausted
    fallback: Option<MockRound>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<ChatRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider replaying `rounds` in order
    pub fn with_rounds(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds.into())),
            ..Default::default()
        }
    }

    /// Replay `round` forever once the script runs out
    pub fn repeating(mut self, round: MockRound) -> Self {
        self.fallback = Some(round);
        self
    }

    /// Append a round to the script
    pub fn push_round(&self, round: MockRound) {
        lock(&self.rounds).push_back(round);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Number of invocations so far
    pub fn call_count(&self) -> usize {
        lock(&self.recorded_requests).len()
    }

    fn next_round(&self) -> Option<MockRound> {
        lock(&self.rounds)
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_delta: &mut DeltaSink<'_>,
    ) -> Result<()> {
        lock(&self.recorded_requests).push(request.clone());

        let round = self.next_round().ok_or_else(|| {
            GalError::Config("mock provider has no scripted rounds left".to_string())
        })?;

        if let Some(delay) = round.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GalError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(GalError::Cancelled);
        }

        for delta in round.deltas {
            on_delta(delta)?;
        }

        match round.failure {
            Some(message) => Err(ApiError::StreamError(message).into()),
            None => Ok(()),
        }
    }
}
