// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory for creating LLM providers
//!
//! Maps a configured provider entry to the adapter for its wire protocol.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, Settings};
use crate::error::{GalError, Result};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{AnthropicProvider, OpenAiProvider};
use crate::llm::transport::RetryingTransport;

/// Wire protocol of a provider endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat-completions SSE
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Messages SSE
    Anthropic,
}

/// Factory for creating LLM providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the adapter for one configured provider
    pub fn create(
        name: &str,
        config: &ProviderConfig,
        transport: Arc<RetryingTransport>,
    ) -> Result<Arc<dyn LlmProvider>> {
        tracing::debug!(target: "gal.llm.factory", provider = name, kind = ?config.kind, "creating provider");

        let api_key = config.resolved_api_key();
        let provider: Arc<dyn LlmProvider> = match config.kind {
            // Local OpenAI-compatible servers usually need no key.
            ProviderKind::OpenAi => {
                let api_key = api_key.unwrap_or_default();
                match config.base_url.as_deref() {
                    Some(base_url) => {
                        Arc::new(OpenAiProvider::with_base_url(api_key, base_url, transport))
                    }
                    None => Arc::new(OpenAiProvider::new(api_key, transport)),
                }
            }
            ProviderKind::Anthropic => {
                let api_key = api_key.ok_or_else(|| {
                    GalError::Config(format!(
                        "No API key found for provider '{}'. Set api_key or api_key_env in gal.yaml.",
                        name
                    ))
                })?;
                match config.base_url.as_deref() {
                    Some(base_url) => {
                        Arc::new(AnthropicProvider::with_base_url(api_key, base_url, transport))
                    }
                    None => Arc::new(AnthropicProvider::new(api_key, transport)),
                }
            }
        };

        Ok(provider)
    }

    /// Create the adapter serving a `provider/model` reference
    pub fn for_model(
        settings: &Settings,
        model: &str,
        transport: Arc<RetryingTransport>,
    ) -> Result<Arc<dyn LlmProvider>> {
        let (name, config) = settings.provider_for_model(model)?;
        Self::create(name, config, transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::transport::TransportConfig;

    fn transport() -> Arc<RetryingTransport> {
        Arc::new(RetryingTransport::new(TransportConfig::default()).unwrap())
    }

    fn config(kind: ProviderKind, key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            kind,
            api_key: key.map(String::from),
            api_key_env: None,
            base_url: Some("http://localhost:9".to_string()),
            models: Vec::new(),
        }
    }

    #[test]
    fn test_provider_kind_serde() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenAi).unwrap(),
            "\"openai\""
        );
        let kind: ProviderKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert!(serde_json::from_str::<ProviderKind>("\"ollama\"").is_err());
    }

    #[test]
    fn test_create_dispatches_on_kind() {
        let openai = ProviderFactory::create("a", &config(ProviderKind::OpenAi, Some("k")), transport())
            .unwrap();
        assert_eq!(openai.name(), "openai");

        let anthropic =
            ProviderFactory::create("b", &config(ProviderKind::Anthropic, Some("k")), transport())
                .unwrap();
        assert_eq!(anthropic.name(), "anthropic");
    }

    #[test]
    fn test_keyless_openai_endpoint_is_allowed() {
        let provider =
            ProviderFactory::create("ollama", &config(ProviderKind::OpenAi, None), transport())
                .unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_anthropic_without_key_fails() {
        let result =
            ProviderFactory::create("claude", &config(ProviderKind::Anthropic, None), transport());
        assert!(matches!(result, Err(GalError::Config(ref m)) if m.contains("claude")));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_creation_logged_under_factory_target() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("gal.llm.factory=debug")
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            ProviderFactory::create("local", &config(ProviderKind::OpenAi, None), transport())
                .unwrap();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("gal.llm.factory"), "{}", logs);
        assert!(logs.contains("creating provider"), "{}", logs);
    }

    #[test]
    fn test_for_model_resolves_provider() {
        let mut settings = Settings::default();
        settings
            .providers
            .insert("claude".to_string(), config(ProviderKind::Anthropic, Some("k")));
        let provider =
            ProviderFactory::for_model(&settings, "claude/claude-sonnet-4", transport()).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert!(ProviderFactory::for_model(&settings, "other/x", transport()).is_err());
    }
}
