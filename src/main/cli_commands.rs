// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;

use gal::config::{AgentConfig, Settings};
use gal::error::Result;
use gal::tools::builtin::register_builtins;
use gal::tools::ToolRegistry;

/// Write the default config files under `home`
pub(super) fn run_init(home: &Path) -> Result<()> {
    for (path, created) in Settings::init_home(home)? {
        if created {
            println!("created {}", path.display());
        } else {
            println!("exists  {} (left unchanged)", path.display());
        }
    }
    Ok(())
}

pub(super) fn run_agent_list(settings: &Settings) {
    for line in agent_lines(settings) {
        println!("{}", line);
    }
}

pub(super) fn run_agent_show(settings: &Settings, name: &str) -> Result<()> {
    let agent = settings.agent(Some(name))?;
    println!("{}", describe_agent(name, agent));
    Ok(())
}

pub(super) fn run_tool_list(working_directory: &Path) {
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, working_directory);
    for line in tool_lines(&registry) {
        println!("{}", line);
    }
}

fn agent_lines(settings: &Settings) -> Vec<String> {
    settings
        .agents
        .iter()
        .map(|(name, agent)| {
            format!(
                "  {:<15} {}",
                name,
                agent.description.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

fn describe_agent(name: &str, agent: &AgentConfig) -> String {
    let mcps: Vec<&str> = agent.mcps.keys().map(String::as_str).collect();
    [
        format!("Name:          {}", name),
        format!("Description:   {}", agent.description.as_deref().unwrap_or_default()),
        format!("Default Model: {}", agent.initial_model().unwrap_or("(none)")),
        format!("Models:        {}", agent.models.join(", ")),
        format!("Tools:         {}", if agent.tools.is_empty() { "(all builtin)".to_string() } else { agent.tools.join(", ") }),
        format!("MCPs:          {}", mcps.join(", ")),
    ]
    .join("\n")
}

/// First sentence or line of a tool description
fn summary(description: &str) -> &str {
    match description.find(['.', '\n']) {
        Some(end) if end > 0 => &description[..end],
        _ => description,
    }
}

fn tool_lines(registry: &ToolRegistry) -> Vec<String> {
    registry
        .definitions(&registry.names())
        .iter()
        .map(|def| format!("  {:<12} {}", def.name, summary(&def.description)))
        .collect()
}
