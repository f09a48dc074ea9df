// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool input schema helpers

use serde_json::Value;

/// Helper to create a tool input schema
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "description": description }),
            required,
        )
    }

    /// Add a string property restricted to `values`
    pub fn string_enum(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "string", "description": description, "enum": values }),
            required,
        )
    }

    /// Add an integer property
    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "integer", "description": description }),
            required,
        )
    }

    /// Add a boolean property
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "boolean", "description": description }),
            required,
        )
    }

    /// Add a free-form object property
    pub fn object(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "object", "description": description }),
            required,
        )
    }

    /// Add an array property whose items match `items`
    pub fn array(self, name: &str, description: &str, items: Value, required: bool) -> Self {
        self.property(
            name,
            serde_json::json!({ "type": "array", "description": description, "items": items }),
            required,
        )
    }

    /// Build the object schema
    pub fn build(self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
