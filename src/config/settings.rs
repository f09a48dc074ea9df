// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for gal
//!
//! Settings live in ~/.gal/gal.yaml, with one file per agent under
//! ~/.gal/agents/.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::llm::factory::ProviderKind;

mod io;
mod validation;

/// Main settings structure, stored in ~/.gal/gal.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Estimated-token limit that triggers context compression (0 disables)
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// Maximum model rounds per turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Agent used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    /// HTTP transport settings shared by all providers
    #[serde(default)]
    pub transport: TransportSettings,

    /// Named provider endpoints
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Agents defined inline; files in `agents/` are merged in on load
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            max_rounds: default_max_rounds(),
            default_agent: None,
            transport: TransportSettings::default(),
            providers: BTreeMap::new(),
            agents: BTreeMap::new(),
        }
    }
}

/// Retry and timeout settings for API calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on 429/5xx
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Abort a stream after this many seconds without data
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// One provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Wire protocol spoken by the endpoint
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key; wins over `api_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL for the API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Models available from this provider
    #[serde(default)]
    pub models: Vec<String>,
}

/// Agent definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub system_prompt: String,

    /// Models the agent may switch between, as `provider/model`
    #[serde(default)]
    pub models: Vec<String>,

    /// Model used at start; falls back to the first entry of `models`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Builtin tools exposed to the model; empty exposes all
    #[serde(default)]
    pub tools: Vec<String>,

    /// Remote tool servers; an empty list is accepted as no servers
    #[serde(default, deserialize_with = "mcp_map")]
    pub mcps: BTreeMap<String, McpConfig>,
}

impl AgentConfig {
    /// Model the agent starts with
    pub fn initial_model(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.models.first().map(String::as_str))
    }
}

/// Remote tool server endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_mcp_timeout_secs")]
    pub timeout: u64,
}

fn mcp_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, McpConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList {
        Map(BTreeMap<String, McpConfig>),
        List(Vec<IgnoredAny>),
    }

    Ok(match Option::<MapOrList>::deserialize(deserializer)? {
        Some(MapOrList::Map(map)) => map,
        Some(MapOrList::List(_)) | None => BTreeMap::new(),
    })
}

fn default_context_limit() -> usize {
    60000
}

fn default_max_rounds() -> u32 {
    50
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_mcp_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.context_limit, 60000);
        assert_eq!(settings.max_rounds, 50);
        assert!(settings.providers.is_empty());
        assert!(settings.default_agent.is_none());
    }

    #[test]
    fn test_transport_settings_default() {
        let transport = TransportSettings::default();
        assert_eq!(transport.timeout_secs, 1800);
        assert_eq!(transport.max_retries, 1);
        assert_eq!(transport.retry_delay_ms, 2000);
        assert_eq!(transport.idle_timeout_secs, 300);
    }

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.context_limit, 60000);
        assert_eq!(settings.transport, TransportSettings::default());
    }

    #[test]
    fn test_provider_config_parses_type() {
        let json = r#"{"type": "anthropic", "api_key": "k", "models": ["claude-sonnet-4"]}"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, ProviderKind::Anthropic);
        assert_eq!(config.models, vec!["claude-sonnet-4"]);

        let config: ProviderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_agent_initial_model() {
        let mut agent = AgentConfig {
            models: vec!["a/one".to_string(), "b/two".to_string()],
            ..Default::default()
        };
        assert_eq!(agent.initial_model(), Some("a/one"));

        agent.default_model = Some("b/two".to_string());
        assert_eq!(agent.initial_model(), Some("b/two"));

        assert_eq!(AgentConfig::default().initial_model(), None);
    }

    #[test]
    fn test_agent_mcps_accept_empty_list() {
        let agent: AgentConfig = serde_yaml::from_str("system_prompt: x\nmcps: []\n").unwrap();
        assert!(agent.mcps.is_empty());

        let agent: AgentConfig =
            serde_yaml::from_str("mcps:\n  search:\n    url: http://localhost:7/mcp\n").unwrap();
        assert_eq!(agent.mcps["search"].url, "http://localhost:7/mcp");
    }

    #[test]
    fn test_mcp_timeout_default() {
        let config: McpConfig = serde_json::from_str(r#"{"url": "http://x"}"#).unwrap();
        assert_eq!(config.timeout, 30);
        assert!(config.headers.is_empty());
    }
}
