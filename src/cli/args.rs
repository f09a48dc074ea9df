// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Gal - agentic LLM chat with tools
#[derive(Parser, Debug)]
#[command(name = "gal")]
#[command(version, about = "Agentic LLM chat with tools for your terminal")]
pub struct Cli {
    /// Agent to use (defaults to `default_agent` from settings)
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Model to use, as provider/model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Working directory for file and shell tools (defaults to current)
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Settings file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run a single turn with this message and exit.
    /// `@path` reads the message from a file, `-` from stdin.
    pub message: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write default gal.yaml and agents/default.yaml to the gal home
    Init,

    /// Inspect configured agents
    Agent(AgentArgs),

    /// Inspect builtin tools
    Tool(ToolArgs),
}

/// Arguments for agent inspection
#[derive(clap::Args, Debug)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommands,
}

/// Agent subcommands
#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// List all agents
    List,

    /// Show one agent's configuration
    Show {
        /// Agent name
        name: String,
    },
}

/// Arguments for tool inspection
#[derive(clap::Args, Debug)]
pub struct ToolArgs {
    #[command(subcommand)]
    pub command: ToolCommands,
}

/// Tool subcommands
#[derive(Subcommand, Debug)]
pub enum ToolCommands {
    /// List all builtin tools
    List,
}
