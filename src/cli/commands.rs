// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! REPL input parsing

use std::io::Read;

use crate::error::{GalError, Result};

/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text sent to the model
    Message(String),
    Clear,
    Compress,
    /// Show the current model
    ShowModel,
    /// List the agent's models
    ListModels,
    /// Switch to `provider/model`
    SwitchModel(String),
    /// Show the current agent
    ShowAgent,
    /// List configured agents
    ListAgents,
    /// Switch to another agent with a fresh conversation
    SwitchAgent(String),
    /// List configured MCP servers
    ListMcp,
    Help,
    Quit,
    /// Blank line
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        if !line.starts_with('/') {
            return ReplCommand::Message(line.to_string());
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.next();
        match (command, argument) {
            ("/quit" | "/exit", _) => ReplCommand::Quit,
            ("/clear", _) => ReplCommand::Clear,
            ("/compress", _) => ReplCommand::Compress,
            ("/model", None) => ReplCommand::ShowModel,
            ("/model", Some("list")) => ReplCommand::ListModels,
            ("/model", Some(model)) => ReplCommand::SwitchModel(model.to_string()),
            ("/agent", None) => ReplCommand::ShowAgent,
            ("/agent", Some("list")) => ReplCommand::ListAgents,
            ("/agent", Some(agent)) => ReplCommand::SwitchAgent(agent.to_string()),
            ("/mcp", _) => ReplCommand::ListMcp,
            ("/help", _) => ReplCommand::Help,
            (other, _) => ReplCommand::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /agent               Show the current agent
  /agent list          List agents
  /agent <name>        Switch agent (starts a new conversation)
  /model               Show the current model
  /model list          List the agent's models
  /model <name>        Switch model (provider/model)
  /mcp                 List MCP servers
  /compress            Compress the conversation now
  /clear               Clear conversation
  /help                Show this help
  /quit                Exit

Ctrl-C cancels the running turn.";

/// Resolve the one-shot message argument.
///
/// `@path` reads a file and `-` reads stdin; anything else is used as-is.
pub fn resolve_message(argument: &str) -> Result<String> {
    if argument == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input.trim_end().to_string());
    }
    if let Some(path) = argument.strip_prefix('@') {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GalError::InvalidInput(format!("cannot read {}: {}", path, e)))?;
        return Ok(content.trim_end().to_string());
    }
    Ok(argument.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_messages_and_blank() {
        assert_eq!(ReplCommand::parse("  "), ReplCommand::Empty);
        assert_eq!(
            ReplCommand::parse(" hello there "),
            ReplCommand::Message("hello there".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/exit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/clear"), ReplCommand::Clear);
        assert_eq!(ReplCommand::parse("/compress"), ReplCommand::Compress);
        assert_eq!(ReplCommand::parse("/mcp"), ReplCommand::ListMcp);
        assert_eq!(ReplCommand::parse("/help"), ReplCommand::Help);
    }

    #[test]
    fn test_parse_model_variants() {
        assert_eq!(ReplCommand::parse("/model"), ReplCommand::ShowModel);
        assert_eq!(ReplCommand::parse("/model list"), ReplCommand::ListModels);
        assert_eq!(
            ReplCommand::parse("/model anthropic/claude-sonnet-4"),
            ReplCommand::SwitchModel("anthropic/claude-sonnet-4".to_string())
        );
    }

    #[test]
    fn test_parse_agent_variants() {
        assert_eq!(ReplCommand::parse("/agent"), ReplCommand::ShowAgent);
        assert_eq!(ReplCommand::parse("/agent list"), ReplCommand::ListAgents);
        assert_eq!(
            ReplCommand::parse("/agent  coder "),
            ReplCommand::SwitchAgent("coder".to_string())
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            ReplCommand::parse("/skill coder"),
            ReplCommand::Unknown("/skill".to_string())
        );
    }

    #[test]
    fn test_resolve_message_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "summarize the repo\n").unwrap();

        let message = resolve_message(&format!("@{}", path.display())).unwrap();
        assert_eq!(message, "summarize the repo");
        assert_eq!(resolve_message("plain").unwrap(), "plain");
    }

    #[test]
    fn test_resolve_message_missing_file() {
        let result = resolve_message("@/nonexistent/gal/prompt.txt");
        assert!(matches!(result, Err(GalError::InvalidInput(_))));
    }
}
