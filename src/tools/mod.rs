// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for gal
//!
//! The [`ToolRegistry`] maps tool names to a definition, a handler, and a
//! [`ConcurrencyClass`]. Builtin tools live in [`builtin`]; remote tools are
//! registered by [`crate::mcp::McpClient`] through the [`ToolProvider`] seam.

pub mod builtin;
pub mod definition;

pub use definition::*;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{GalError, Result};
use crate::llm::provider::ToolDefinition;

/// Whether a tool may run alongside other tools in the same round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyClass {
    /// Observes state only; safe to run concurrently with other ReadOnly tools
    ReadOnly,
    /// Changes state; forces the round to run serially
    Mutating,
}

/// Executes one tool invocation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool on parsed JSON arguments and return its textual result
    async fn call(&self, args: Value) -> Result<String>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn call(&self, args: Value) -> Result<String> {
        (self)(args).await
    }
}

/// A self-describing tool, used for builtins
pub trait Tool: ToolHandler {
    fn definition(&self) -> ToolDefinition;

    fn concurrency(&self) -> ConcurrencyClass;
}

/// Registration seam handed to collaborators that contribute tools
pub trait ToolProvider {
    fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
        class: ConcurrencyClass,
    );
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
    class: ConcurrencyClass,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a self-describing tool
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) {
        let definition = tool.definition();
        let class = tool.concurrency();
        self.register(definition, Arc::new(tool), class);
    }

    /// Whether `name` is registered as ReadOnly. Unknown names are not.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .is_some_and(|t| t.class == ConcurrencyClass::ReadOnly)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool definitions.
    ///
    /// An empty `names` returns every definition ordered by name; otherwise
    /// definitions come back in the requested order, skipping unknown names.
    pub fn definitions<S: AsRef<str>>(&self, names: &[S]) -> Vec<ToolDefinition> {
        if names.is_empty() {
            return self.tools.values().map(|t| t.definition.clone()).collect();
        }
        names
            .iter()
            .filter_map(|name| self.tools.get(name.as_ref()))
            .map(|t| t.definition.clone())
            .collect()
    }

    /// List all tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute `name` with its raw JSON argument string.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String> {
        let handler = self
            .tools
            .get(name)
            .map(|t| Arc::clone(&t.handler))
            .ok_or_else(|| GalError::UnknownTool(name.to_string()))?;

        let args: Value = if arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(arguments).map_err(|e| {
                GalError::InvalidInput(format!("invalid arguments for {}: {}", name, e))
            })?
        };

        let started = Instant::now();
        let result = handler.call(args).await;
        tracing::debug!(
            target: "gal.tools.registry",
            tool = name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool executed"
        );
        result
    }
}

impl ToolProvider for ToolRegistry {
    /// Register a tool, replacing any earlier registration under the same name.
    fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
        class: ConcurrencyClass,
    ) {
        let name = definition.name.clone();
        let replaced = self.tools.insert(
            name.clone(),
            RegisteredTool {
                definition,
                handler,
                class,
            },
        );
        if replaced.is_some() {
            tracing::warn!(target: "gal.tools.registry", tool = %name, "replacing registered tool");
        }
    }
}

/// Parse an optional string argument
pub(crate) fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input[key].as_str().filter(|s| !s.is_empty())
}

/// Parse a required string argument
pub(crate) fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    input[key]
        .as_str()
        .ok_or_else(|| GalError::InvalidInput(format!("{} is required", key)))
}

/// Cut `text` to at most `max` characters, appending `suffix` when cut.
pub(crate) fn truncate_chars(text: &str, max: usize, suffix: &str) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}{}", &text[..byte], suffix),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, format!("{} tool", name), SchemaBuilder::new().build())
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            def("echo"),
            Arc::new(|args: Value| async move { Ok::<_, GalError>(args.to_string()) }),
            ConcurrencyClass::ReadOnly,
        );
        registry.register(
            def("fail"),
            Arc::new(|_args: Value| async move {
                Err::<String, _>(GalError::ToolExecution("nope".to_string()))
            }),
            ConcurrencyClass::Mutating,
        );
        registry
    }

    #[tokio::test]
    async fn test_execute_parses_arguments() {
        let registry = echo_registry();
        assert_eq!(registry.execute("echo", "{\"a\":1}").await.unwrap(), "{\"a\":1}");
        assert_eq!(registry.execute("echo", "").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let err = registry_err(echo_registry().execute("missing", "{}").await);
        assert!(matches!(err, GalError::UnknownTool(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_execute_invalid_arguments() {
        let err = registry_err(echo_registry().execute("echo", "{not json").await);
        assert!(matches!(err, GalError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_execute_handler_error_propagates() {
        let err = registry_err(echo_registry().execute("fail", "{}").await);
        assert_eq!(err.to_string(), "Tool execution failed: nope");
    }

    fn registry_err(result: Result<String>) -> GalError {
        match result {
            Ok(v) => panic!("expected error, got {}", v),
            Err(e) => e,
        }
    }

    #[test]
    fn test_concurrency_class_lookup() {
        let registry = echo_registry();
        assert!(registry.is_read_only("echo"));
        assert!(!registry.is_read_only("fail"));
        assert!(!registry.is_read_only("missing"));
    }

    #[test]
    fn test_definitions_order() {
        let mut registry = echo_registry();
        registry.register(
            def("alpha"),
            Arc::new(|_: Value| async move { Ok::<_, GalError>(String::new()) }),
            ConcurrencyClass::ReadOnly,
        );

        let all: Vec<String> = registry
            .definitions::<&str>(&[])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(all, vec!["alpha", "echo", "fail"]);

        let picked: Vec<String> = registry
            .definitions(&["fail", "ghost", "alpha"])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(picked, vec!["fail", "alpha"]);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let mut registry = echo_registry();
        registry.register(
            def("echo"),
            Arc::new(|_: Value| async move { Ok::<_, GalError>("replaced".to_string()) }),
            ConcurrencyClass::Mutating,
        );
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_read_only("echo"));
        assert_eq!(registry.execute("echo", "{}").await.unwrap(), "replaced");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2, "..."), "hé...");
        assert_eq!(truncate_chars("hi", 2, "..."), "hi");
    }
}
