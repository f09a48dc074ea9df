// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for gal
//!
//! Provides the canonical message model, the streaming provider contract,
//! and one adapter per supported wire protocol.

pub mod factory;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod transport;

pub use message::*;
pub use provider::*;
