// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Gal - agentic LLM chat with tools
//!
//! Entry point for the gal CLI application.

use std::sync::Arc;

use clap::Parser;

use gal::chat::MaskingMakeWriter;
use gal::cli::{resolve_message, AgentCommands, Cli, Commands, ToolCommands};
use gal::config::Settings;
use gal::error::Result;
use gal::llm::transport::{RetryingTransport, TransportConfig};

#[path = "main/cli_commands.rs"]
mod cli_commands;
#[path = "main/console.rs"]
mod console;
#[path = "main/repl.rs"]
mod repl;
#[path = "main/session.rs"]
mod session;

use console::stdin_lines;
use repl::{run_turn, Repl};
use session::AgentSession;

fn init_tracing(verbose: u8) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on engine and transport diagnostics; `RUST_LOG` still applies.
    if verbose > 0 {
        let mut directives = vec!["gal.chat.engine=debug", "gal.llm.transport=debug"];
        if verbose > 1 {
            directives.extend([
                "gal.llm.openai=debug",
                "gal.llm.anthropic=debug",
                "gal.llm.factory=debug",
                "gal.tools.http=debug",
                "gal.tools.browser=debug",
                "gal.tools.registry=debug",
                "gal.context.compressor=debug",
                "gal.mcp=debug",
                "gal.config=debug",
            ]);
        }
        for directive in directives {
            if let Ok(parsed) = directive.parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(MaskingMakeWriter::new(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let working_directory = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    if let Some(Commands::Init) = &cli.command {
        let home = cli
            .config
            .as_deref()
            .and_then(|path| path.parent())
            .map_or_else(Settings::gal_home, |dir| dir.to_path_buf());
        return cli_commands::run_init(&home);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match &cli.command {
        Some(Commands::Agent(args)) => {
            return match &args.command {
                AgentCommands::List => {
                    cli_commands::run_agent_list(&settings);
                    Ok(())
                }
                AgentCommands::Show { name } => cli_commands::run_agent_show(&settings, name),
            };
        }
        Some(Commands::Tool(args)) => {
            return match args.command {
                ToolCommands::List => {
                    cli_commands::run_tool_list(&working_directory);
                    Ok(())
                }
            };
        }
        Some(Commands::Init) | None => {}
    }

    settings.validate()?;

    let transport = Arc::new(RetryingTransport::new(TransportConfig::from(
        &settings.transport,
    ))?);
    let lines = stdin_lines();
    let session = AgentSession::start(
        &settings,
        cli.agent.as_deref(),
        cli.model.clone(),
        &working_directory,
        &transport,
        &lines,
    )
    .await?;

    match &cli.message {
        Some(argument) => {
            let mut session = session;
            let result = match resolve_message(argument) {
                Ok(message) => run_turn(&mut session.engine, &message).await,
                Err(error) => Err(error),
            };
            session.shutdown().await;
            result
        }
        None => {
            let mut repl = Repl {
                session,
                settings: &settings,
                working_directory,
                transport,
                lines,
            };
            let result = repl.run().await;
            repl.session.shutdown().await;
            result
        }
    }
}
