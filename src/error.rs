// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Gal
//!
//! Turn-level failures abort the turn and roll the transcript back. Tool-level
//! failures never leave this module as errors at the engine boundary: the engine
//! downgrades them to result text.

use thiserror::Error;

/// Main error type for Gal operations
#[derive(Error, Debug)]
pub enum GalError {
    /// Provider and transport errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool name not present in the registry
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// The model produced neither text nor tool calls
    #[error("empty response from model (round {round})")]
    EmptyResponse { round: u32 },

    /// The agentic loop did not settle within the round cap
    #[error("agentic loop exceeded {0} rounds")]
    RoundLimitExceeded(u32),

    /// The turn was cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// Interactive input collaborator failed or was dismissed
    #[error("Interactive input failed: {0}")]
    Interactive(String),

    /// Context compression errors
    #[error("Compression failed: {0}")]
    Compression(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-2xx response; carries the raw body
    #[error("API error {status}: {body}")]
    Protocol { status: u16, body: String },

    /// Body ended before the completion marker
    #[error("stream ended before completion: {0}")]
    StreamIncomplete(String),

    /// No bytes arrived within the idle timeout
    #[error("stream stalled: no data for {0} seconds")]
    StreamStalled(u64),

    /// Error event reported inside the stream
    #[error("Streaming error: {0}")]
    StreamError(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),
}

impl GalError {
    /// True for failures raised by the provider or its transport.
    pub fn is_api(&self) -> bool {
        matches!(self, GalError::Api(_) | GalError::Http(_))
    }
}

/// Result type alias for Gal operations
pub type Result<T> = std::result::Result<T, GalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_carries_status_and_body() {
        let err = GalError::Api(ApiError::Protocol {
            status: 401,
            body: "{\"error\":\"bad key\"}".to_string(),
        });
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("bad key"));
    }

    #[test]
    fn test_stalled_is_distinct_from_incomplete() {
        let stalled = ApiError::StreamStalled(300).to_string();
        let incomplete = ApiError::StreamIncomplete("no [DONE]".to_string()).to_string();
        assert!(stalled.contains("stalled"));
        assert!(stalled.contains("300"));
        assert!(!incomplete.contains("stalled"));
    }

    #[test]
    fn test_round_limit_message() {
        let err = GalError::RoundLimitExceeded(50);
        assert_eq!(err.to_string(), "agentic loop exceeded 50 rounds");
    }

    #[test]
    fn test_empty_response_names_round() {
        let err = GalError::EmptyResponse { round: 3 };
        assert!(err.to_string().contains("round 3"));
    }

    #[test]
    fn test_unknown_tool() {
        let err = GalError::UnknownTool("nope".to_string());
        assert_eq!(err.to_string(), "unknown tool: nope");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GalError = io.into();
        assert!(matches!(err, GalError::Io(_)));
        assert!(!err.is_api());
    }

    #[test]
    fn test_api_error_conversion() {
        let err: GalError = ApiError::Network("reset".to_string()).into();
        assert!(err.is_api());
        assert!(err.to_string().contains("reset"));
    }
}
