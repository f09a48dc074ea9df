// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{GalError, Result};

use super::{AgentConfig, Settings};

/// Written by `gal init` when no settings file exists
pub const DEFAULT_SETTINGS_YAML: &str = r#"default_agent: default

providers:
  openai:
    type: openai
    api_key_env: OPENAI_API_KEY
    base_url: https://api.openai.com/v1
    models:
      - gpt-4o
      - gpt-4o-mini
  anthropic:
    type: anthropic
    api_key_env: ANTHROPIC_API_KEY
    base_url: https://api.anthropic.com
    models:
      - claude-sonnet-4-20250514
      - claude-haiku-4-20250414
  deepseek:
    type: openai
    api_key_env: DEEPSEEK_API_KEY
    base_url: https://api.deepseek.com/v1
    models:
      - deepseek-chat
      - deepseek-reasoner
  ollama:
    type: openai
    base_url: http://localhost:11434/v1
    models:
      - llama3
      - qwen2
"#;

/// Written by `gal init` as `agents/default.yaml`
pub const DEFAULT_AGENT_YAML: &str = r#"description: General-purpose assistant
system_prompt: |
  You are a helpful assistant.

models:
  - openai/gpt-4o
  - openai/gpt-4o-mini
  - anthropic/claude-sonnet-4-20250514
  - anthropic/claude-haiku-4-20250414
  - deepseek/deepseek-chat
  - deepseek/deepseek-reasoner
  - ollama/llama3
default_model: openai/gpt-4o

tools:
  - file_read
  - file_write
  - bash

mcps: {}
"#;

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::gal_home().join("gal.yaml")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    ///
    /// A missing file yields defaults. Agents defined in the `agents/`
    /// directory next to the file are merged in, keyed by file stem; they
    /// replace inline agents of the same name. Environment references in
    /// string values are expanded before deserializing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            read_yaml::<Self>(path)?.unwrap_or_default()
        } else {
            tracing::debug!(target: "gal.config", path = %path.display(), "no settings file, using defaults");
            Self::default()
        };

        let agents_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("agents"), |dir| dir.join("agents"));
        for (name, agent) in load_agents(&agents_dir)? {
            if settings.agents.insert(name.clone(), agent).is_some() {
                tracing::debug!(target: "gal.config", agent = %name, "agent file overrides inline agent");
            }
        }

        Ok(settings)
    }

    /// Get the gal home directory (~/.gal or $GAL_HOME).
    pub fn gal_home() -> PathBuf {
        if let Ok(home) = std::env::var("GAL_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gal")
    }

    /// Write the default `gal.yaml` and `agents/default.yaml` under `home`.
    ///
    /// Existing files are left untouched. Returns each path with whether it
    /// was created.
    pub fn init_home(home: &Path) -> Result<Vec<(PathBuf, bool)>> {
        std::fs::create_dir_all(home.join("agents"))?;

        let mut written = Vec::new();
        for (path, content) in [
            (home.join("gal.yaml"), DEFAULT_SETTINGS_YAML),
            (home.join("agents").join("default.yaml"), DEFAULT_AGENT_YAML),
        ] {
            let created = !path.exists();
            if created {
                std::fs::write(&path, content)?;
                tracing::debug!(target: "gal.config", path = %path.display(), "wrote default config");
            }
            written.push((path, created));
        }
        Ok(written)
    }
}

/// Load every `*.yaml` agent file in `dir`. A missing directory has no agents.
fn load_agents(dir: &Path) -> Result<BTreeMap<String, AgentConfig>> {
    let mut agents = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(agents);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if !is_yaml || !path.is_file() {
            continue;
        }
        let agent = read_yaml::<AgentConfig>(&path)?.unwrap_or_default();
        agents.insert(name.to_string(), agent);
    }

    tracing::debug!(target: "gal.config", dir = %dir.display(), agents = agents.len(), "loaded agent files");
    Ok(agents)
}

/// Parse a YAML file after env expansion. An empty document yields `None`.
fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = std::fs::read_to_string(path)?;
    let raw: Value = serde_yaml::from_str(&content)
        .map_err(|e| GalError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    if raw.is_null() {
        return Ok(None);
    }
    serde_yaml::from_value(expand_env(raw))
        .map(Some)
        .map_err(|e| GalError::Config(format!("Invalid config in {}: {}", path.display(), e)))
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("env pattern is valid")
    })
}

/// Expand `${VAR}` and `$VAR` in a string. Unset variables expand to "".
pub(crate) fn expand_env_str(input: &str) -> String {
    env_pattern()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Expand environment references in every string value of a YAML tree.
/// Mapping keys are left alone.
fn expand_env(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(expand_env_str(&s)),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(expand_env).collect()),
        Value::Mapping(map) => {
            Value::Mapping(map.into_iter().map(|(k, v)| (k, expand_env(v))).collect())
        }
        other => other,
    }
}
