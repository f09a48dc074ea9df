// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context management
//!
//! Keeps the transcript within the model's context window by summarizing its
//! oldest messages once a token estimate passes the configured limit.

pub mod compressor;

pub use compressor::{estimate_tokens, find_boundary, flatten, needs_compression, Compressor};
