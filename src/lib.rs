// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Gal - agentic orchestration engine.
//!
//! This crate drives multi-round conversations between a user, a language
//! model backend and a set of callable tools.
//!
//! Architecture highlights:
//! - `llm`: canonical message model, vendor stream adapters and the retrying transport
//! - `tools`: tool registry with read-only/mutating concurrency classes and builtins
//! - `chat`: the turn-loop engine, interactive input and sensitive-value masking
//! - `context`: token estimation and summary-based transcript compression
//! - `mcp`: remote JSON-RPC tool source
//! - `config`, `cli`: settings file and the thin `gal` binary surface

pub mod chat;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod tools;

pub use error::{GalError, Result};
