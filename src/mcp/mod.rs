// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model Context Protocol (MCP) client
//!
//! Loads tools from remote MCP servers configured per agent and registers
//! them alongside the builtin tools.

pub mod client;
pub mod protocol;

pub use client::McpClient;
pub use protocol::PROTOCOL_VERSION;
