// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Line REPL driving the engine

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gal::chat::{mask_secrets, Engine};
use gal::cli::{ReplCommand, HELP};
use gal::config::Settings;
use gal::error::Result;
use gal::llm::factory::ProviderFactory;
use gal::llm::transport::RetryingTransport;

use crate::console::{prompt, read_line, ConsoleObserver, SharedLines};
use crate::session::AgentSession;

/// Run one turn, cancelling it on Ctrl-C
pub async fn run_turn(engine: &mut Engine, input: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut observer = ConsoleObserver::default();
    let result = engine.send(input, &mut observer, &cancel).await;
    watcher.abort();
    observer.finish();
    result
}

pub struct Repl<'a> {
    pub session: AgentSession,
    pub settings: &'a Settings,
    pub working_directory: PathBuf,
    pub transport: Arc<RetryingTransport>,
    pub lines: SharedLines,
}

impl Repl<'_> {
    pub async fn run(&mut self) -> Result<()> {
        eprintln!(
            "gal {} | agent {} | model {} | /help for commands",
            env!("CARGO_PKG_VERSION"),
            self.session.name,
            self.session.engine.model()
        );

        loop {
            prompt("> ")?;
            let line = tokio::select! {
                line = read_line(&self.lines) => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                eprintln!();
                break;
            };

            match ReplCommand::parse(&line) {
                ReplCommand::Empty => {}
                ReplCommand::Quit => break,
                ReplCommand::Help => println!("{}", HELP),
                ReplCommand::Clear => {
                    self.session.engine.clear();
                    println!("conversation cleared");
                }
                ReplCommand::Compress => self.compress().await,
                ReplCommand::ShowAgent => println!("agent: {}", self.session.name),
                ReplCommand::ListAgents => {
                    for name in self.settings.agents.keys() {
                        let marker = if *name == self.session.name { "▶" } else { " " };
                        println!("{} {}", marker, name);
                    }
                }
                ReplCommand::SwitchAgent(name) => self.switch_agent(name).await,
                ReplCommand::ShowModel => println!("model: {}", self.session.engine.model()),
                ReplCommand::ListModels => {
                    for model in &self.session.agent.models {
                        let marker = if model == self.session.engine.model() { "▶" } else { " " };
                        println!("{} {}", marker, model);
                    }
                }
                ReplCommand::SwitchModel(model) => self.switch_model(model),
                ReplCommand::ListMcp => {
                    if self.session.agent.mcps.is_empty() {
                        println!("no MCP servers configured");
                    }
                    for (name, config) in &self.session.agent.mcps {
                        println!("  {:<15} {}", name, config.url);
                    }
                }
                ReplCommand::Unknown(command) => {
                    eprintln!("unknown command: {} (type /help)", command)
                }
                ReplCommand::Message(text) => {
                    if let Err(error) = run_turn(&mut self.session.engine, &text).await {
                        eprintln!("error: {}", mask_secrets(&error.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    async fn compress(&mut self) {
        let engine = &mut self.session.engine;
        if !engine.needs_compression() {
            println!("context is within the limit, nothing to compress");
            return;
        }
        match engine.compress(&CancellationToken::new()).await {
            Ok(0) => println!("nothing to compress"),
            Ok(folded) => println!("compressed {} messages", folded),
            Err(error) => eprintln!("compression failed: {}", mask_secrets(&error.to_string())),
        }
    }

    /// Replace the session with one for `name`. The old one is kept on failure.
    async fn switch_agent(&mut self, name: String) {
        let started = AgentSession::start(
            self.settings,
            Some(&name),
            None,
            &self.working_directory,
            &self.transport,
            &self.lines,
        )
        .await;
        match started {
            Ok(next) => {
                let previous = std::mem::replace(&mut self.session, next);
                previous.shutdown().await;
                println!(
                    "agent: {} (model: {})",
                    self.session.name,
                    self.session.engine.model()
                );
            }
            Err(error) => eprintln!("error: {}", error),
        }
    }

    fn switch_model(&mut self, model: String) {
        match ProviderFactory::for_model(self.settings, &model, Arc::clone(&self.transport)) {
            Ok(provider) => {
                self.session.engine.switch_provider(provider, model);
                println!("model: {}", self.session.engine.model());
            }
            Err(error) => eprintln!("error: {}", error),
        }
    }
}
