// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{GalError, Result};
use crate::llm::message::model_provider;

use super::{AgentConfig, ProviderConfig, Settings};

impl ProviderConfig {
    /// Get the API key, checking the configured env var first.
    pub fn resolved_api_key(&self) -> Option<String> {
        // Priority: env var > config file.
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.is_empty()))
    }
}

impl Settings {
    /// Look up the provider serving a `provider/model` reference.
    pub fn provider_for_model(&self, model: &str) -> Result<(&str, &ProviderConfig)> {
        let name = model_provider(model).ok_or_else(|| {
            GalError::Config(format!(
                "model '{}' must be written as provider/model",
                model
            ))
        })?;
        self.providers
            .get_key_value(name)
            .map(|(name, config)| (name.as_str(), config))
            .ok_or_else(|| GalError::Config(format!("unknown provider '{}'", name)))
    }

    /// Look up an agent, falling back to `default_agent` when `name` is None.
    pub fn agent(&self, name: Option<&str>) -> Result<&AgentConfig> {
        let name = name
            .or(self.default_agent.as_deref())
            .ok_or_else(|| GalError::Config("no agent given and no default_agent set".into()))?;
        self.agents
            .get(name)
            .ok_or_else(|| GalError::Config(format!("unknown agent '{}'", name)))
    }

    /// Check cross-references between providers and agents.
    ///
    /// Keys are not checked here: keyless OpenAI-compatible endpoints are
    /// valid, and a missing key only matters once that provider is used.
    pub fn validate(&self) -> Result<()> {
        for (name, agent) in &self.agents {
            let models = agent
                .initial_model()
                .into_iter()
                .chain(agent.models.iter().map(String::as_str));
            for model in models {
                self.provider_for_model(model).map_err(|e| {
                    GalError::Config(format!("agent '{}': {}", name, e))
                })?;
            }
        }

        if let Some(ref agent) = self.default_agent {
            if !self.agents.contains_key(agent) {
                return Err(GalError::Config(format!(
                    "default_agent '{}' is not defined",
                    agent
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::factory::ProviderKind;

    fn provider(key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::OpenAi,
            api_key: key.map(String::from),
            api_key_env: None,
            base_url: None,
            models: vec!["gpt-4o".to_string()],
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.providers.insert("oa".to_string(), provider(Some("k")));
        settings.agents.insert(
            "coder".to_string(),
            AgentConfig {
                models: vec!["oa/gpt-4o".to_string()],
                ..Default::default()
            },
        );
        settings
    }

    #[test]
    fn test_env_key_wins_over_file_key() {
        std::env::set_var("GAL_VALIDATION_TEST_KEY", "from-env");
        let mut config = provider(Some("from-file"));
        config.api_key_env = Some("GAL_VALIDATION_TEST_KEY".to_string());
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-env"));

        config.api_key_env = Some("GAL_VALIDATION_TEST_UNSET".to_string());
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn test_empty_key_is_missing() {
        assert!(provider(Some("")).resolved_api_key().is_none());
    }

    #[test]
    fn test_provider_for_model() {
        let settings = settings();
        let (name, config) = settings.provider_for_model("oa/gpt-4o").unwrap();
        assert_eq!(name, "oa");
        assert_eq!(config.kind, ProviderKind::OpenAi);

        assert!(settings.provider_for_model("gpt-4o").is_err());
        assert!(settings.provider_for_model("zz/gpt-4o").is_err());
    }

    #[test]
    fn test_agent_lookup_uses_default() {
        let mut settings = settings();
        assert!(settings.agent(None).is_err());
        settings.default_agent = Some("coder".to_string());
        assert!(settings.agent(None).is_ok());
        assert!(settings.agent(Some("missing")).is_err());
    }

    #[test]
    fn test_keyless_provider_is_valid() {
        let mut settings = Settings::default();
        let mut ollama = provider(None);
        ollama.base_url = Some("http://localhost:11434/v1".to_string());
        settings.providers.insert("ollama".to_string(), ollama);
        settings.agents.insert(
            "local".to_string(),
            AgentConfig {
                models: vec!["ollama/gpt-4o".to_string()],
                ..Default::default()
            },
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut settings = settings();
        assert!(settings.validate().is_ok());

        settings.agents.get_mut("coder").unwrap().default_model = Some("nope/x".to_string());
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("coder"));

        let mut settings = self::settings();
        settings.agents.get_mut("coder").unwrap().models.push("ghost/x".to_string());
        assert!(settings.validate().is_err());

        let mut settings = self::settings();
        settings.default_agent = Some("ghost".to_string());
        assert!(settings.validate().is_err());
    }
}
