// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP request tool
//!
//! Any method, optional query parameters, per-call timeout and redirect
//! control. The result is a JSON object the model can inspect field by field.

use async_trait::async_trait;
use reqwest::{redirect, Method};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{
    optional_str, required_str, truncate_chars, ConcurrencyClass, SchemaBuilder, Tool,
    ToolHandler,
};

/// Bytes read from a response before the rest is discarded
const MAX_RESPONSE_BYTES: usize = 10 << 20;
/// Characters of body handed back to the model
const MAX_BODY_PREVIEW: usize = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 300;

/// Tool for making HTTP requests
pub struct HttpTool {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

impl HttpTool {
    pub fn new() -> Self {
        let build = |policy| {
            reqwest::Client::builder()
                .redirect(policy)
                .build()
                .unwrap_or_default()
        };
        Self {
            client: build(redirect::Policy::default()),
            no_redirect: build(redirect::Policy::none()),
        }
    }
}

impl Default for HttpTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for HttpTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "http",
            "Make HTTP requests to any URL. Prefer this over curl or wget in bash. Supports GET, POST, PUT, DELETE, PATCH, HEAD and OPTIONS. Returns JSON with status, status_text, headers, body, size, truncated and time_ms. For secrets, collect them with the interactive tool first and pass them via headers.",
            SchemaBuilder::new()
                .string("method", "HTTP method (default: GET)", false)
                .string("url", "Complete URL including protocol", true)
                .object("headers", "Request headers (key-value pairs)", false)
                .string("body", "Request body (for POST/PUT/PATCH)", false)
                .object("query", "Query parameters (URL-encoded automatically)", false)
                .integer("timeout", "Timeout in seconds (default 30, max 300)", false)
                .boolean("follow_redirects", "Whether to follow redirects (default true)", false)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::ReadOnly
    }
}

/// Render a JSON argument value as a plain string.
fn plain(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

#[async_trait]
impl ToolHandler for HttpTool {
    async fn call(&self, input: Value) -> Result<String> {
        let mut url = required_str(&input, "url")?.to_string();
        if url.is_empty() {
            return Err(GalError::InvalidInput("url is required".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            url = format!("http://{}", url);
        }
        let method = optional_str(&input, "method").unwrap_or("GET").to_ascii_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| GalError::InvalidInput(format!("invalid method '{}'", method)))?;
        let timeout_secs = input["timeout"]
            .as_u64()
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);
        let client = if input["follow_redirects"].as_bool() == Some(false) {
            &self.no_redirect
        } else {
            &self.client
        };

        let mut request = client
            .request(method, &url)
            .timeout(Duration::from_secs(timeout_secs))
            .header(reqwest::header::USER_AGENT, "gal/0.1");
        if let Some(query) = input["query"].as_object() {
            let pairs: Vec<(&str, String)> =
                query.iter().map(|(k, v)| (k.as_str(), plain(v))).collect();
            request = request.query(&pairs);
        }
        if let Some(headers) = input["headers"].as_object() {
            for (name, value) in headers {
                request = request.header(name.as_str(), plain(value));
            }
        }
        if let Some(body) = optional_str(&input, "body") {
            request = request.body(body.to_string());
        }

        let started = Instant::now();
        let mut response = request
            .send()
            .await
            .map_err(|e| GalError::ToolExecution(format!("request failed: {}", e)))?;
        let time_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        let mut headers = Map::new();
        for name in response.headers().keys() {
            let joined = response
                .headers()
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            headers.insert(name.to_string(), Value::String(joined));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| GalError::ToolExecution(format!("failed to read body: {}", e)))?
        {
            let room = MAX_RESPONSE_BYTES - bytes.len();
            bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if bytes.len() >= MAX_RESPONSE_BYTES {
                break;
            }
        }

        let text = String::from_utf8_lossy(&bytes);
        let body = truncate_chars(&text, MAX_BODY_PREVIEW, "...(truncated)");
        let truncated = body.len() != text.len();
        tracing::debug!(target: "gal.tools.http", status = status.as_u16(), size = bytes.len(), time_ms, "http request finished");

        Ok(json!({
            "status": status.as_u16(),
            "status_text": status.to_string(),
            "headers": headers,
            "body": body,
            "size": bytes.len(),
            "truncated": truncated,
            "time_ms": time_ms,
        })
        .to_string())
    }
}
