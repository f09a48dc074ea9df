// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retrying HTTP transport shared by every stream adapter
//!
//! Requests are retried only on HTTP 429 and 5xx, with a fixed delay between
//! attempts, replaying the original body. Connection failures are not retried.
//! Streamed bodies are read through [`SseLineReader`], which aborts with a
//! stalled-stream error when no bytes arrive within the idle timeout.

use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::settings::TransportSettings;
use crate::error::{ApiError, GalError, Result};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout, streaming included
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Maximum silence while reading a streamed body
    pub idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
        }
    }
}

/// Statuses worth another attempt: rate limiting and server errors.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// HTTP client with bounded retry
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: Client,
    config: TransportConfig,
}

impl RetryingTransport {
    /// Create a transport with the given configuration
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// POST a JSON body and return a line reader over the successful response.
    ///
    /// A non-2xx status that is not retried (or is still failing after the last
    /// retry) becomes [`ApiError::Protocol`] with the raw response body.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<SseLineReader> {
        let payload = serde_json::to_vec(body)?;
        let mut attempt = 0;

        loop {
            let send = self
                .client
                .post(url)
                .headers(headers.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone())
                .send();

            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(GalError::Cancelled),
                result = send => result.map_err(|e| ApiError::Network(e.to_string()))?,
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                if attempt > 0 {
                    tracing::debug!(
                        target: "gal.llm.transport",
                        url,
                        attempts = attempt + 1,
                        "request succeeded after retry"
                    );
                }
                return Ok(SseLineReader::new(response, self.config.idle_timeout));
            }

            if is_retryable_status(status) && attempt < self.config.max_retries {
                // Release the connection before waiting.
                drop(response);
                attempt += 1;
                tracing::warn!(
                    target: "gal.llm.transport",
                    url,
                    status,
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = self.config.retry_delay.as_millis() as u64,
                    "retryable status, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(GalError::Cancelled),
                    _ = sleep(self.config.retry_delay) => {}
                }
                continue;
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(
                        target: "gal.llm.transport",
                        url,
                        status,
                        error = %e,
                        "failed to read error body"
                    );
                    format!("<failed to read response body: {}>", e)
                }
            };
            tracing::debug!(
                target: "gal.llm.transport",
                url,
                status,
                body = %body,
                "request failed"
            );
            return Err(ApiError::Protocol { status, body }.into());
        }
    }
}

/// Reads a streamed response body line by line with an idle timeout.
///
/// Lines are split on `\n` at the byte level, so multi-byte characters split
/// across network chunks are reassembled before decoding. The response is
/// dropped together with the reader.
pub struct SseLineReader {
    response: Response,
    buffer: Vec<u8>,
    idle_timeout: Duration,
    finished: bool,
}

impl SseLineReader {
    fn new(response: Response, idle_timeout: Duration) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            idle_timeout,
            finished: false,
        }
    }

    /// Next complete line without its terminator, or `None` at end of body.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Ok(Some(decode_line(&line)));
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                return Ok(Some(decode_line(&rest)));
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(GalError::Cancelled),
                read = timeout(self.idle_timeout, self.response.chunk()) => read,
            };

            match read {
                Err(_) => {
                    tracing::warn!(
                        target: "gal.llm.transport",
                        idle_secs = self.idle_timeout.as_secs(),
                        "stream stalled"
                    );
                    return Err(ApiError::StreamStalled(self.idle_timeout.as_secs()).into());
                }
                Ok(Err(e)) => return Err(ApiError::Network(e.to_string()).into()),
                Ok(Ok(Some(chunk))) => self.buffer.extend_from_slice(&chunk),
                Ok(Ok(None)) => self.finished = true,
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_transport_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(1800));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(600));
    }

    #[test]
    fn test_decode_line_strips_crlf() {
        assert_eq!(decode_line(b"data: x\r\n"), "data: x");
        assert_eq!(decode_line(b"data: y"), "data: y");
    }

    #[tokio::test]
    async fn test_post_stream_reads_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string("one\ntwo\r\nthree"))
            .mount(&server)
            .await;

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let cancel = CancellationToken::new();
        let mut reader = transport
            .post_stream(
                &format!("{}/stream", server.uri()),
                HeaderMap::new(),
                &serde_json::json!({}),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(reader.next_line(&cancel).await.unwrap().as_deref(), Some("one"));
        assert_eq!(reader.next_line(&cancel).await.unwrap().as_deref(), Some("two"));
        assert_eq!(reader.next_line(&cancel).await.unwrap().as_deref(), Some("three"));
        assert_eq!(reader.next_line(&cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retries_on_server_error_then_fails_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let result = transport
            .post_stream(
                &server.uri(),
                HeaderMap::new(),
                &serde_json::json!({"a": 1}),
                &CancellationToken::new(),
            )
            .await;

        match result {
            Err(GalError::Api(ApiError::Protocol { status, body })) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected protocol error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let err = transport
            .post_stream(
                &server.uri(),
                HeaderMap::new(),
                &serde_json::json!({}),
                &CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();

        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_rate_limit_retry_replays_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::body_json(serde_json::json!({"n": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok\n"))
            .mount(&server)
            .await;

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let cancel = CancellationToken::new();
        let mut reader = transport
            .post_stream(
                &server.uri(),
                HeaderMap::new(),
                &serde_json::json!({"n": 7}),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(reader.next_line(&cancel).await.unwrap().as_deref(), Some("ok"));
    }

    /// Serve one chunked response that sends a single line and then goes silent.
    async fn spawn_stalling_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(b"8\r\ndata: a\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_idle_timeout_reports_stalled_stream() {
        let url = spawn_stalling_server().await;
        let mut config = fast_config();
        config.idle_timeout = Duration::from_millis(200);
        let transport = RetryingTransport::new(config).unwrap();
        let cancel = CancellationToken::new();

        let mut reader = transport
            .post_stream(&url, HeaderMap::new(), &serde_json::json!({}), &cancel)
            .await
            .unwrap();
        assert_eq!(reader.next_line(&cancel).await.unwrap().as_deref(), Some("data: a"));

        let err = reader.next_line(&cancel).await.err().unwrap();
        assert!(matches!(err, GalError::Api(ApiError::StreamStalled(_))));
    }

    #[tokio::test]
    async fn test_unreadable_error_body_is_reported() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            // Promise more bytes than are sent, then hang up.
            let head = "HTTP/1.1 400 Bad Request\r\ncontent-length: 100\r\n\r\nshort";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let err = transport
            .post_stream(
                &format!("http://{}", addr),
                HeaderMap::new(),
                &serde_json::json!({}),
                &CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();

        match err {
            GalError::Api(ApiError::Protocol { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.starts_with("<failed to read response body"), "{}", body);
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let transport = RetryingTransport::new(fast_config()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transport
            .post_stream(&server.uri(), HeaderMap::new(), &serde_json::json!({}), &cancel)
            .await;
        assert!(matches!(result, Err(GalError::Cancelled)));
    }
}
