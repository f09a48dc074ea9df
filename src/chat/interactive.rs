// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Interactive input requests
//!
//! The model asks for user input through the `interactive` tool. The engine
//! parses the call arguments into [`FieldRequest`]s and hands them to an
//! [`InteractiveInput`] collaborator, which returns the collected values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// How a field is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text entry
    FreeText,
    /// One of the listed options
    Choice,
}

/// A single value requested from the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest {
    /// Key used in the returned value map
    pub name: String,
    pub kind: FieldKind,
    /// Prompt text; defaults to the field name
    pub hint: String,
    pub options: Vec<String>,
    /// Secret values are masked in logs and previews
    pub sensitive: bool,
}

impl FieldRequest {
    /// Match an answer against the options: a 1-based number or the exact option text.
    pub fn resolve_choice(&self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if let Ok(number) = answer.parse::<usize>() {
            if let Some(option) = number.checked_sub(1).and_then(|i| self.options.get(i)) {
                return Some(option.clone());
            }
        }
        self.options.iter().find(|o| o.as_str() == answer).cloned()
    }
}

/// Parse the `fields` array of an interactive tool call.
///
/// Returns `None` when `fields` is missing or not an array, so the call is not
/// treated as interactive. Entries that are not objects are skipped.
pub fn parse_interactive_fields(args: &Value) -> Option<Vec<FieldRequest>> {
    let fields = args.get("fields")?.as_array()?;

    let requests = fields
        .iter()
        .filter_map(Value::as_object)
        .map(|field| {
            let name = field
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let hint = field
                .get("interactive_hint")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .map_or_else(|| name.clone(), str::to_string);
            let options: Vec<String> = field
                .get("options")
                .and_then(Value::as_array)
                .map(|opts| {
                    opts.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let kind = match field.get("interactive_type").and_then(Value::as_str) {
                Some("select") => FieldKind::Choice,
                _ if !options.is_empty() => FieldKind::Choice,
                _ => FieldKind::FreeText,
            };
            let sensitive = field
                .get("sensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            FieldRequest {
                name,
                kind,
                hint,
                options,
                sensitive,
            }
        })
        .collect();

    Some(requests)
}

/// Collaborator that collects field values from the user.
///
/// Implementations may block indefinitely waiting for input. Returning an
/// error (for example when the user dismisses the prompt) aborts the turn.
#[async_trait]
pub trait InteractiveInput: Send + Sync {
    async fn collect(&self, fields: &[FieldRequest]) -> Result<BTreeMap<String, String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_blank_and_select_fields() {
        let args = json!({
            "fields": [
                {"name": "password", "interactive_type": "blank", "interactive_hint": "Root password", "sensitive": true},
                {"name": "env", "interactive_type": "select", "options": ["prod", "staging"]}
            ]
        });
        let fields = parse_interactive_fields(&args).unwrap();
        assert_eq!(fields.len(), 2);

        assert_eq!(fields[0].name, "password");
        assert_eq!(fields[0].kind, FieldKind::FreeText);
        assert_eq!(fields[0].hint, "Root password");
        assert!(fields[0].sensitive);

        assert_eq!(fields[1].kind, FieldKind::Choice);
        assert_eq!(fields[1].hint, "env");
        assert_eq!(fields[1].options, vec!["prod", "staging"]);
        assert!(!fields[1].sensitive);
    }

    #[test]
    fn test_options_force_choice() {
        let args = json!({"fields": [{"name": "confirm", "options": ["yes", "no"]}]});
        let fields = parse_interactive_fields(&args).unwrap();
        assert_eq!(fields[0].kind, FieldKind::Choice);
    }

    #[test]
    fn test_resolve_choice() {
        let args = json!({"fields": [{"name": "env", "options": ["prod", "staging"]}]});
        let fields = parse_interactive_fields(&args).unwrap();
        let field = &fields[0];
        assert_eq!(field.resolve_choice("2").as_deref(), Some("staging"));
        assert_eq!(field.resolve_choice(" prod ").as_deref(), Some("prod"));
        assert_eq!(field.resolve_choice("0"), None);
        assert_eq!(field.resolve_choice("3"), None);
        assert_eq!(field.resolve_choice("dev"), None);
    }

    #[test]
    fn test_missing_fields_is_not_interactive() {
        assert!(parse_interactive_fields(&json!({})).is_none());
        assert!(parse_interactive_fields(&json!({"fields": "name"})).is_none());
    }

    #[test]
    fn test_empty_fields_array() {
        let fields = parse_interactive_fields(&json!({"fields": []})).unwrap();
        assert!(fields.is_empty());
    }
}
