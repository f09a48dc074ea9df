// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use gal::config::Settings;
use gal::error::GalError;
use gal::llm::factory::{ProviderFactory, ProviderKind};
use gal::llm::transport::{RetryingTransport, TransportConfig};

const SETTINGS: &str = r#"
context_limit: 32000
default_agent: coder
transport:
  max_retries: 2
  retry_delay_ms: 500
providers:
  openai:
    type: openai
    api_key: ${GAL_CONFIG_TEST_OPENAI_KEY}
  claude:
    type: anthropic
    api_key: sk-file
    api_key_env: GAL_CONFIG_TEST_CLAUDE_KEY
    base_url: http://localhost:9
  local:
    type: openai
    base_url: http://localhost:11434/v1
    models: [llama3]
"#;

const CODER_AGENT: &str = r#"
system_prompt: You write code.
models:
  - openai/gpt-4o
  - claude/claude-sonnet-4
tools: [file_read, grep]
mcps:
  search:
    url: http://localhost:7/mcp
    headers:
      Authorization: Bearer $GAL_CONFIG_TEST_MCP_TOKEN
"#;

/// Lay out `gal.yaml` plus `agents/*.yaml` the way `gal init` does.
fn write_home(dir: &TempDir, settings: &str, agents: &[(&str, &str)]) -> PathBuf {
    let path = dir.path().join("gal.yaml");
    fs::write(&path, settings).unwrap();
    fs::create_dir_all(dir.path().join("agents")).unwrap();
    for (name, content) in agents {
        fs::write(dir.path().join("agents").join(format!("{}.yaml", name)), content).unwrap();
    }
    path
}

#[test]
fn test_load_full_settings_file() {
    std::env::set_var("GAL_CONFIG_TEST_OPENAI_KEY", "sk-openai");
    std::env::set_var("GAL_CONFIG_TEST_MCP_TOKEN", "mcp-token");
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&write_home(&dir, SETTINGS, &[("coder", CODER_AGENT)])).unwrap();

    assert_eq!(settings.context_limit, 32000);
    assert_eq!(settings.max_rounds, 50);
    assert_eq!(settings.transport.max_retries, 2);
    assert_eq!(settings.transport.retry_delay_ms, 500);
    assert_eq!(settings.transport.idle_timeout_secs, 300);

    let openai = &settings.providers["openai"];
    assert_eq!(openai.kind, ProviderKind::OpenAi);
    assert_eq!(openai.api_key.as_deref(), Some("sk-openai"));
    assert_eq!(settings.providers["claude"].kind, ProviderKind::Anthropic);

    let agent = settings.agent(None).unwrap();
    assert_eq!(agent.system_prompt, "You write code.");
    assert_eq!(agent.initial_model(), Some("openai/gpt-4o"));
    assert_eq!(agent.tools, vec!["file_read", "grep"]);
    let mcp = &agent.mcps["search"];
    assert_eq!(mcp.headers["Authorization"], "Bearer mcp-token");
    assert_eq!(mcp.timeout, 30);

    settings.validate().unwrap();
}

#[test]
fn test_env_key_takes_priority() {
    let dir = TempDir::new().unwrap();
    std::env::set_var("GAL_CONFIG_TEST_OPENAI_KEY", "sk-openai");
    let settings = Settings::load_from(&write_home(&dir, SETTINGS, &[("coder", CODER_AGENT)])).unwrap();

    let claude = &settings.providers["claude"];
    std::env::remove_var("GAL_CONFIG_TEST_CLAUDE_KEY");
    assert_eq!(claude.resolved_api_key().as_deref(), Some("sk-file"));

    std::env::set_var("GAL_CONFIG_TEST_CLAUDE_KEY", "sk-env");
    assert_eq!(claude.resolved_api_key().as_deref(), Some("sk-env"));
    std::env::remove_var("GAL_CONFIG_TEST_CLAUDE_KEY");
}

#[test]
fn test_model_routes_to_provider() {
    std::env::set_var("GAL_CONFIG_TEST_OPENAI_KEY", "sk-openai");
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&write_home(&dir, SETTINGS, &[("coder", CODER_AGENT)])).unwrap();

    let (name, config) = settings.provider_for_model("claude/claude-sonnet-4").unwrap();
    assert_eq!(name, "claude");
    assert_eq!(config.base_url.as_deref(), Some("http://localhost:9"));

    let transport = Arc::new(
        RetryingTransport::new(TransportConfig::from(&settings.transport)).unwrap(),
    );
    let provider =
        ProviderFactory::for_model(&settings, "claude/claude-sonnet-4", Arc::clone(&transport))
            .unwrap();
    assert_eq!(provider.name(), "anthropic");

    let err = ProviderFactory::for_model(&settings, "mystery/model", transport).unwrap_err();
    assert!(matches!(err, GalError::Config(ref m) if m.contains("unknown provider 'mystery'")));
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("absent.yaml")).unwrap();

    assert_eq!(settings.context_limit, 60000);
    assert!(settings.agents.is_empty());
    assert!(matches!(settings.agent(None), Err(GalError::Config(_))));
}

#[test]
fn test_validate_rejects_unknown_default_agent() {
    let dir = TempDir::new().unwrap();
    let path = write_home(&dir, "default_agent: ghost\n", &[]);
    let settings = Settings::load_from(&path).unwrap();

    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("default_agent 'ghost'"));
}

#[test]
fn test_validate_rejects_agent_model_without_provider() {
    let dir = TempDir::new().unwrap();
    let path = write_home(&dir, "", &[("a", "models: [nowhere/model]\n")]);
    let settings = Settings::load_from(&path).unwrap();

    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("agent 'a'"));
}

#[test]
fn test_invalid_yaml_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_home(&dir, "providers: [unclosed", &[]);
    assert!(matches!(Settings::load_from(&path), Err(GalError::Config(_))));
}

#[test]
fn test_broken_agent_file_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = write_home(&dir, "", &[("bad", "models: {nested: [\n")]);
    let err = Settings::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("bad.yaml"));
}

#[test]
fn test_keyless_local_provider_validates_and_builds() {
    std::env::remove_var("GAL_CONFIG_TEST_NO_SUCH_KEY");
    let dir = TempDir::new().unwrap();
    let path = write_home(
        &dir,
        SETTINGS,
        &[("coder", CODER_AGENT), ("local", "models: [local/llama3]\n")],
    );
    let settings = Settings::load_from(&path).unwrap();
    settings.validate().unwrap();

    assert!(settings.providers["local"].resolved_api_key().is_none());
    let transport = Arc::new(RetryingTransport::new(TransportConfig::default()).unwrap());
    let provider = ProviderFactory::for_model(&settings, "local/llama3", transport).unwrap();
    assert_eq!(provider.name(), "openai");
}

#[test]
fn test_init_writes_loadable_defaults() {
    let dir = TempDir::new().unwrap();
    let written = Settings::init_home(dir.path()).unwrap();
    assert_eq!(written.len(), 2);

    let settings = Settings::load_from(&dir.path().join("gal.yaml")).unwrap();
    settings.validate().unwrap();
    assert_eq!(settings.default_agent.as_deref(), Some("default"));

    let agent = settings.agent(None).unwrap();
    assert_eq!(agent.initial_model(), Some("openai/gpt-4o"));
    assert_eq!(agent.tools, vec!["file_read", "file_write", "bash"]);
    assert!(settings.providers["ollama"].api_key_env.is_none());
}
