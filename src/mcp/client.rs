// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! MCP client over streamable HTTP
//!
//! Every request is a JSON-RPC POST to the server URL. The session lock is
//! held for the whole exchange, so calls from parallel tool batches are
//! serialized per server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::McpConfig;
use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::llm::stream::sse_data;
use crate::tools::{ConcurrencyClass, ToolHandler, ToolProvider};

use super::protocol::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcRequest, JsonRpcResponse,
    ToolsListResult, SESSION_HEADER,
};

#[derive(Debug, Default)]
struct Session {
    next_id: u64,
    session_id: Option<String>,
    closed: bool,
}

/// Client for one configured MCP server
pub struct McpClient {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    http: reqwest::Client,
    session: Mutex<Session>,
}

impl McpClient {
    pub fn new(name: impl Into<String>, config: &McpConfig) -> Result<Self> {
        let timeout = if config.timeout == 0 { 30 } else { config.timeout };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;
        Ok(Self {
            name: name.into(),
            url: config.url.clone(),
            headers: config.headers.clone(),
            http,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perform the `initialize` handshake
    pub async fn connect(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::default())?;
        self.call("initialize", Some(params)).await?;
        tracing::info!(target: "gal.mcp", server = %self.name, "connected");
        Ok(())
    }

    /// List the tools the server offers
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let raw = self.call("tools/list", None).await?;
        let result: ToolsListResult = serde_json::from_value(raw)
            .map_err(|e| GalError::ToolExecution(format!("parse tools/list: {}", e)))?;
        Ok(result
            .tools
            .into_iter()
            .map(|tool| ToolDefinition::new(tool.name, tool.description, tool.input_schema))
            .collect())
    }

    /// Call a tool and return its text output.
    ///
    /// A result without the usual content shape is returned as raw JSON.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let raw = self.call("tools/call", Some(params)).await?;
        match serde_json::from_value::<CallToolResult>(raw.clone()) {
            Ok(result) => Ok(result.text()),
            Err(_) => Ok(raw.to_string()),
        }
    }

    /// Register every listed tool with `provider`. Returns the registered names.
    pub async fn register_tools(
        self: &Arc<Self>,
        provider: &mut dyn ToolProvider,
    ) -> Result<Vec<String>> {
        let tools = self.list_tools().await?;
        let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        for definition in tools {
            let handler = McpToolHandler {
                client: Arc::clone(self),
                tool: definition.name.clone(),
            };
            provider.register(definition, Arc::new(handler), ConcurrencyClass::Mutating);
        }
        tracing::info!(target: "gal.mcp", server = %self.name, tools = names.len(), "tools registered");
        Ok(names)
    }

    /// End the session. Later calls fail.
    pub async fn close(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.closed {
            return Ok(());
        }
        session.closed = true;

        if let Some(id) = session.session_id.take() {
            let mut request = self.http.delete(&self.url).header(SESSION_HEADER, id);
            for (key, value) in &self.headers {
                request = request.header(key.as_str(), value.as_str());
            }
            if let Err(e) = request.send().await {
                tracing::debug!(target: "gal.mcp", server = %self.name, error = %e, "session delete failed");
            }
        }
        tracing::debug!(target: "gal.mcp", server = %self.name, "closed");
        Ok(())
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut session = self.session.lock().await;
        if session.closed {
            return Err(GalError::Config(format!(
                "mcp server '{}' is closed",
                self.name
            )));
        }
        session.next_id += 1;
        let request = JsonRpcRequest::new(session.next_id, method, params);

        let mut builder = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&request);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(id) = &session.session_id {
            builder = builder.header(SESSION_HEADER, id.as_str());
        }

        tracing::debug!(target: "gal.mcp", server = %self.name, method, id = request.id, "request");

        let response = builder
            .send()
            .await
            .map_err(|e| GalError::ToolExecution(format!("mcp request failed: {}", e)))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            session.session_id = Some(id.to_string());
        }

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(GalError::ToolExecution(format!(
                "mcp HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let response = parse_response(&body, is_event_stream)?;
        if let Some(error) = response.error {
            return Err(GalError::ToolExecution(format!(
                "mcp error {}: {}",
                error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Parse a JSON body, or the first JSON-RPC message carried by an SSE body
fn parse_response(body: &str, is_event_stream: bool) -> Result<JsonRpcResponse> {
    let parse_error = |e: serde_json::Error| GalError::ToolExecution(format!("mcp parse response: {}", e));
    if !is_event_stream {
        return serde_json::from_str(body).map_err(parse_error);
    }
    body.lines()
        .filter_map(sse_data)
        .find_map(|data| serde_json::from_str::<JsonRpcResponse>(data).ok())
        .ok_or_else(|| GalError::ToolExecution("mcp parse response: no message in event stream".to_string()))
}

/// Registry handler forwarding to one remote tool
struct McpToolHandler {
    client: Arc<McpClient>,
    tool: String,
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    async fn call(&self, args: Value) -> Result<String> {
        self.client.call_tool(&self.tool, args).await
    }
}
