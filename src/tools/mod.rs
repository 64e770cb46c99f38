//! Tool catalog shared by agents.
//!
//! A tool is a named handler plus a JSON-Schema description of its
//! arguments. The registry is a thread-safe map supporting concurrent
//! register/get/list; the executor runs batches of model-requested calls
//! concurrently; the tool loop drives the bounded LLM <-> tools iteration.

mod executor;
mod tool_loop;

pub use executor::{execute_all, ToolOutcome};
pub use tool_loop::{run_tool_loop, ToolLoopFailure, ToolLoopResult, DEFAULT_MAX_ITERATIONS};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::ToolSpec;

/// Async tool handler. Receives the caller's cancellation token and the
/// argument JSON exactly as the model emitted it; returns the tool output
/// as a string. Handlers are expected to be idempotent and safe under
/// cancellation.
pub type ToolHandler =
    Arc<dyn Fn(CancellationToken, String) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema (object/string/number/integer/boolean/array/enum subset).
    pub parameters: Value,
    pub handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Build a tool from an async closure.
    ///
    /// ```ignore
    /// let tool = Tool::new("get_quote", "Latest traded price", params, |_ctx, args| {
    ///     Box::pin(async move { Ok(format!("quote for {}", args)) })
    /// });
    /// ```
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(CancellationToken, String) -> BoxFuture<'static, anyhow::Result<String>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

// ============================================================================
// Parameter schema helpers
// ============================================================================

/// Builder for the JSON-Schema subset tools describe their arguments with.
///
/// Produces plain `serde_json::Value` so providers can ship it to the wire
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct Params {
    properties: Vec<(String, Value)>,
    required: Vec<String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, schema: Value) -> Self {
        self.required.push(name.to_string());
        self.properties.push((name.to_string(), schema));
        self
    }

    pub fn optional(mut self, name: &str, schema: Value) -> Self {
        self.properties.push((name.to_string(), schema));
        self
    }

    pub fn build(self) -> Value {
        let mut properties = serde_json::Map::new();
        for (name, schema) in self.properties {
            properties.insert(name, schema);
        }
        let mut out = json!({
            "type": "object",
            "properties": properties,
        });
        if !self.required.is_empty() {
            out["required"] = json!(self.required);
        }
        out
    }
}

pub fn string(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

pub fn number(description: &str) -> Value {
    json!({"type": "number", "description": description})
}

pub fn integer(description: &str) -> Value {
    json!({"type": "integer", "description": description})
}

pub fn boolean(description: &str) -> Value {
    json!({"type": "boolean", "description": description})
}

pub fn array(description: &str, items: Value) -> Value {
    json!({"type": "array", "description": description, "items": items})
}

pub fn enumeration(description: &str, values: &[&str]) -> Value {
    json!({"type": "string", "description": description, "enum": values})
}

/// Attach a default to any schema.
pub fn with_default(mut schema: Value, default: Value) -> Value {
    schema["default"] = default;
    schema
}

// ============================================================================
// Registry
// ============================================================================

/// Thread-safe name -> tool map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous entry with the same name.
    pub fn register(&self, tool: Tool) {
        self.tools
            .write()
            .expect("tool registry lock")
            .insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().expect("tool registry lock").get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().expect("tool registry lock").contains_key(name)
    }

    /// All registered tools, sorted by name for stable listings.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> =
            self.tools.read().expect("tool registry lock").values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Wire-format specs for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list().iter().map(Tool::spec).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every tool from `other` into this registry. Existing names are
    /// kept (first registration wins), which is what the orchestrator's
    /// merged single-agent toolset needs.
    pub fn merge_from(&self, other: &ToolRegistry) {
        let theirs = other.tools.read().expect("tool registry lock");
        let mut ours = self.tools.write().expect("tool registry lock");
        for (name, tool) in theirs.iter() {
            ours.entry(name.clone()).or_insert_with(|| tool.clone());
        }
    }
}
