// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shared streaming machinery for vendor adapters
//!
//! Each adapter supplies an [`SseDecoder`] that turns one SSE line into zero or
//! more [`StreamDelta`]s. [`pump`] drives a decoder over a transport line
//! reader until the completion marker, and fails with
//! [`ApiError::StreamIncomplete`] when the body ends first.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, Result};
use crate::llm::message::ToolCall;
use crate::llm::provider::{DeltaSink, StreamDelta};
use crate::llm::transport::SseLineReader;

/// Position of a decoder within one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    AwaitingEvent,
    InTextBlock,
    InToolBlock,
    Done,
}

/// Tool call being assembled from fragments
#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates tool-call fragments keyed by the vendor-supplied index.
///
/// Fragments for different indices may interleave freely; each index keeps its
/// own argument buffer, and fragments are appended verbatim.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    open: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the call at `index`, or fill in its id/name if they arrive late.
    pub fn open(&mut self, index: usize, id: Option<&str>, name: Option<&str>) {
        let call = self.open.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
    }

    /// Append an argument fragment to the call at `index`.
    pub fn append(&mut self, index: usize, fragment: &str) {
        self.open
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Close the call at `index`, returning it if it was open.
    pub fn finish(&mut self, index: usize) -> Option<ToolCall> {
        self.open
            .remove(&index)
            .map(|partial| Self::complete(index, partial))
    }

    /// Close every open call, in index order.
    pub fn finish_all(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|(index, partial)| Self::complete(index, partial))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    fn complete(index: usize, partial: PartialToolCall) -> ToolCall {
        let id = if partial.id.is_empty() {
            format!("call_{}", index)
        } else {
            partial.id
        };
        ToolCall {
            id,
            name: partial.name,
            arguments: partial.arguments,
        }
    }
}

/// Per-vendor line decoder
pub trait SseDecoder: Send {
    /// Decode one line, forwarding any resulting deltas to `on_delta`.
    ///
    /// Lines that are not valid events must be skipped, not reported.
    fn decode_line(&mut self, line: &str, on_delta: &mut DeltaSink<'_>) -> Result<()>;

    /// Current block state
    fn state(&self) -> BlockState;

    /// Number of events decoded so far, for diagnostics
    fn events_seen(&self) -> usize;
}

/// Drive `decoder` over `reader` until the completion marker.
pub async fn pump<D: SseDecoder>(
    reader: &mut SseLineReader,
    decoder: &mut D,
    cancel: &CancellationToken,
    on_delta: &mut DeltaSink<'_>,
) -> Result<()> {
    while let Some(line) = reader.next_line(cancel).await? {
        decoder.decode_line(&line, on_delta)?;
        if decoder.state() == BlockState::Done {
            return Ok(());
        }
    }

    Err(ApiError::StreamIncomplete(format!(
        "body ended after {} events without a completion marker",
        decoder.events_seen()
    ))
    .into())
}

/// Strip the SSE `data:` prefix, returning the payload.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fragments_equal_single_fragment() {
        let mut split = ToolCallAccumulator::new();
        split.open(0, Some("c1"), Some("f"));
        split.append(0, "{\"a\":1");
        split.append(0, "}");

        let mut whole = ToolCallAccumulator::new();
        whole.open(0, Some("c1"), Some("f"));
        whole.append(0, "{\"a\":1}");

        assert_eq!(split.finish(0), whole.finish(0));
    }

    #[test]
    fn test_interleaved_indices_accumulate_separately() {
        let mut acc = ToolCallAccumulator::new();
        acc.open(1, Some("b"), Some("second"));
        acc.open(0, Some("a"), Some("first"));
        acc.append(0, "{\"x\":");
        acc.append(1, "{\"y\":");
        acc.append(1, "2}");
        acc.append(0, "1}");

        let calls = acc.finish_all();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ToolCall::new("a", "first", "{\"x\":1}"));
        assert_eq!(calls[1], ToolCall::new("b", "second", "{\"y\":2}"));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_late_id_and_missing_id() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(3, "{}");
        acc.open(3, None, Some("grep"));
        let call = acc.finish(3).unwrap();
        assert_eq!(call.id, "call_3");
        assert_eq!(call.name, "grep");

        acc.open(0, Some("first"), None);
        acc.open(0, Some("second"), None);
        assert_eq!(acc.finish(0).unwrap().id, "first");
    }

    #[test]
    fn test_finish_unknown_index() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc.finish(9).is_none());
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(": keep-alive"), None);
    }

    proptest! {
        #[test]
        fn prop_any_split_accumulates_to_same_call(
            args in "[a-z0-9{}:,\"]{0,40}",
            cuts in proptest::collection::vec(0usize..40, 0..6),
        ) {
            let mut points: Vec<usize> = cuts.into_iter().filter(|c| *c <= args.len()).collect();
            points.sort_unstable();
            points.dedup();

            let mut acc = ToolCallAccumulator::new();
            acc.open(0, Some("id"), Some("tool"));
            let mut start = 0;
            for point in points {
                acc.append(0, &args[start..point]);
                start = point;
            }
            acc.append(0, &args[start..]);

            prop_assert_eq!(acc.finish(0), Some(ToolCall::new("id", "tool", args.clone())));
        }
    }
}
