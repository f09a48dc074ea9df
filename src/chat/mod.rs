// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat engine
//!
//! This module provides the turn loop that drives a conversation, along with
//! interactive input collection and masking of sensitive values.

pub mod engine;
pub mod interactive;
pub mod mask;

pub use engine::{
    Engine, EngineConfig, EngineState, NoopTurnObserver, TurnObserver, TurnOutcome,
};
pub use interactive::{parse_interactive_fields, FieldKind, FieldRequest, InteractiveInput};
pub use mask::{mask_secrets, register_secret, MaskingMakeWriter, SecretMasker};
