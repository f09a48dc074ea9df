// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! One agent's engine together with the resources its tools hold open

use std::path::Path;
use std::sync::Arc;

use gal::chat::{Engine, EngineConfig};
use gal::config::{AgentConfig, Settings};
use gal::error::{GalError, Result};
use gal::llm::factory::ProviderFactory;
use gal::llm::transport::RetryingTransport;
use gal::mcp::McpClient;
use gal::tools::builtin::{register_builtins, BrowserSession};
use gal::tools::ToolRegistry;

use crate::console::{SharedLines, StdinInput};

/// Connect every MCP server of the agent and register its tools.
///
/// A server that fails to connect is skipped with a warning.
async fn load_mcp_servers(
    agent: &AgentConfig,
    registry: &mut ToolRegistry,
) -> (Vec<Arc<McpClient>>, Vec<String>) {
    let mut clients = Vec::new();
    let mut names = Vec::new();
    for (name, config) in &agent.mcps {
        let loaded = async {
            let client = Arc::new(McpClient::new(name.as_str(), config)?);
            client.connect().await?;
            let tools = client.register_tools(&mut *registry).await?;
            Ok::<_, GalError>((client, tools))
        }
        .await;
        match loaded {
            Ok((client, tools)) => {
                clients.push(client);
                names.extend(tools);
            }
            Err(error) => {
                tracing::warn!(target: "gal.mcp", server = %name, error = %error, "MCP server unavailable");
                eprintln!("warning: MCP server '{}' unavailable: {}", name, error);
            }
        }
    }
    (clients, names)
}

pub struct AgentSession {
    pub name: String,
    pub agent: AgentConfig,
    pub engine: Engine,
    mcp_clients: Vec<Arc<McpClient>>,
    browser: BrowserSession,
}

impl AgentSession {
    /// Build the engine for `name` (or the default agent).
    ///
    /// `model` overrides the agent's initial model.
    pub async fn start(
        settings: &Settings,
        name: Option<&str>,
        model: Option<String>,
        working_directory: &Path,
        transport: &Arc<RetryingTransport>,
        lines: &SharedLines,
    ) -> Result<Self> {
        let agent = settings.agent(name)?.clone();
        let name = name
            .or(settings.default_agent.as_deref())
            .unwrap_or_default()
            .to_string();
        let model = model
            .or_else(|| agent.initial_model().map(str::to_string))
            .ok_or_else(|| GalError::Config(format!("agent '{}' has no models configured", name)))?;
        let provider = ProviderFactory::for_model(settings, &model, Arc::clone(transport))?;

        let mut registry = ToolRegistry::new();
        let browser = register_builtins(&mut registry, working_directory);
        let mut tool_names: Vec<String> = if agent.tools.is_empty() {
            registry.names().into_iter().map(str::to_string).collect()
        } else {
            agent.tools.clone()
        };
        let (mcp_clients, mcp_tools) = load_mcp_servers(&agent, &mut registry).await;
        tool_names.extend(mcp_tools);

        tracing::debug!(
            target: "gal.chat.engine",
            agent = %name,
            model = %model,
            tools = tool_names.len(),
            working_directory = %working_directory.display(),
            "engine ready"
        );

        let mut engine = Engine::new(
            provider,
            model,
            Arc::new(registry),
            EngineConfig {
                system_prompt: agent.system_prompt.clone(),
                max_rounds: settings.max_rounds,
                context_limit: settings.context_limit,
                tool_names,
            },
        );
        engine.set_interactive(Arc::new(StdinInput::new(Arc::clone(lines))));

        Ok(Self {
            name,
            agent,
            engine,
            mcp_clients,
            browser,
        })
    }

    /// Close MCP connections and the browser, if one was launched.
    pub async fn shutdown(self) {
        for client in &self.mcp_clients {
            if let Err(error) = client.close().await {
                tracing::debug!(target: "gal.mcp", server = client.name(), error = %error, "close failed");
            }
        }
        self.browser.close().await;
    }
}
