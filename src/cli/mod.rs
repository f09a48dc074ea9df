// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for Gal
//!
//! Handles command-line argument parsing and REPL input.

pub mod args;
pub mod commands;

pub use args::*;
pub use commands::{resolve_message, ReplCommand, HELP};
