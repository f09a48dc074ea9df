// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Interactive input tool
//!
//! Only the definition matters to the model. The engine intercepts calls to
//! this tool and collects the values itself; the handler runs only when no
//! input collaborator is attached.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{ConcurrencyClass, SchemaBuilder, Tool, ToolHandler};

pub const INTERACTIVE_TOOL_NAME: &str = "interactive";

/// Tool for collecting values from the user
pub struct InteractiveTool;

impl Tool for InteractiveTool {
    fn definition(&self) -> ToolDefinition {
        let field = serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Field identifier (used as key in result)"},
                "interactive_type": {
                    "type": "string",
                    "description": "Input type: 'blank' for free text, 'select' for choosing from options",
                    "enum": ["blank", "select"]
                },
                "interactive_hint": {"type": "string", "description": "Prompt text shown to the user"},
                "options": {
                    "type": "array",
                    "description": "Available choices (required for 'select')",
                    "items": {"type": "string"}
                },
                "sensitive": {"type": "boolean", "description": "Whether the value is secret, such as a password"}
            },
            "required": ["name", "interactive_type"]
        });

        ToolDefinition::new(
            INTERACTIVE_TOOL_NAME,
            "Collect input from the user instead of asking in text. Use it to gather passwords, choices, or confirmation before destructive operations. Several fields may be requested at once; they are prompted in order. Returns a JSON object mapping field names to values.",
            SchemaBuilder::new()
                .array("fields", "Fields to collect from the user", field, true)
                .build(),
        )
    }

    fn concurrency(&self) -> ConcurrencyClass {
        ConcurrencyClass::Mutating
    }
}

#[async_trait]
impl ToolHandler for InteractiveTool {
    async fn call(&self, _input: Value) -> Result<String> {
        Err(GalError::Interactive(
            "interactive input is not available in this session".to_string(),
        ))
    }
}
