// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use gal::chat::{register_secret, MaskingMakeWriter};
use gal::llm::providers::OpenAiProvider;
use gal::llm::transport::{RetryingTransport, TransportConfig};
use gal::llm::{ChatRequest, LlmProvider, Message};
use gal::tools::builtin::register_builtins;
use gal::tools::ToolRegistry;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_registered_secret_never_reaches_logs() {
    const SECRET: &str = "tok-5ecret-9f3a";
    register_secret(SECRET);

    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(MaskingMakeWriter::new({
            let captured = captured.clone();
            move || captured.clone()
        }))
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // A shell command that times out logs the command line.
    let dir = TempDir::new().unwrap();
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, dir.path());
    let args = serde_json::json!({"command": format!("sleep 5 # {}", SECRET), "timeout": 1});
    let output = registry.execute("bash", &args.to_string()).await.unwrap();
    assert_eq!(output, "command timed out after 1 seconds");

    // A rejected request logs the response body.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(format!(r#"{{"error":"bad key {}"}}"#, SECRET)),
        )
        .mount(&server)
        .await;
    let transport = Arc::new(
        RetryingTransport::new(TransportConfig {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );
    let provider = OpenAiProvider::with_base_url("sk-test", server.uri(), transport);
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);
    let result = provider
        .chat_stream(&request, &CancellationToken::new(), &mut |_| Ok(()))
        .await;
    assert!(result.is_err());

    let logs = captured.text();
    assert!(logs.contains("shell command timed out"), "{}", logs);
    assert!(logs.contains("request failed"), "{}", logs);
    assert!(logs.contains("sleep 5 # ********"), "{}", logs);
    assert!(logs.contains("bad key ********"), "{}", logs);
    assert!(!logs.contains(SECRET), "{}", logs);
}
