//! Unified LLM provider interface.
//!
//! One implementation per vendor wire protocol:
//! - OpenAI-compatible chat completions (`openai`)
//! - Local cooperative servers, Ollama-style NDJSON (`local`)
//! - Gemini generateContent (`gemini`)
//! - Anthropic messages (`anthropic`)
//!
//! The router (`router`) is itself a `Provider`, so consumers never need to
//! know whether they hold a concrete vendor or a fallback chain.

mod anthropic;
mod gemini;
mod local;
mod openai;
pub mod router;
pub(crate) mod sse;
pub mod streaming;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
pub use router::{Complexity, Router, RouterConfig};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LlmResult;

/// Default HTTP timeout for hosted providers.
pub(crate) const REMOTE_TIMEOUT: Duration = Duration::from_secs(120);
/// Local models can be slow to load; give them longer.
pub(crate) const LOCAL_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Messages
// ============================================================================

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single turn in a conversation.
///
/// A `tool` message answers the assistant tool call whose id it references;
/// `name` carries the tool name for vendors that want it on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn carrying tool call requests.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool result answering `call_id` from tool `name`.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// A model-emitted request to invoke a named tool.
///
/// `arguments` is the argument JSON exactly as the vendor sent it; it is
/// never re-serialized between the provider and the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Per-request knobs. Every field is optional; providers silently drop the
/// ones their wire format cannot express.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ChatOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// Why the model stopped emitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
    /// Vendor-specific value passed through unchanged.
    Other(String),
}

impl FinishReason {
    /// Map a vendor finish/stop reason string onto the shared set.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "STOP" => FinishReason::Stop,
            "tool_calls" | "tool_use" => FinishReason::ToolCalls,
            "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
            "error" => FinishReason::Error,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    /// Accumulate usage across multiple calls (tool loop rounds).
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A complete, non-streaming model response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// Model that actually served the request.
    pub model: String,
    /// Provider name (the router reports the concrete provider, not itself).
    pub provider: String,
    pub latency: Duration,
}

/// One decoded unit of a streaming response.
///
/// Content arrives as deltas; tool calls arrive whole (the Anthropic adapter
/// assembles `input_json_delta` fragments before emitting).
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub content_delta: String,
    pub tool_call: Option<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    pub done: bool,
}

impl StreamChunk {
    pub(crate) fn delta(text: impl Into<String>) -> Self {
        Self {
            content_delta: text.into(),
            ..Self::default()
        }
    }

    pub(crate) fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

/// Tool schema as sent on the wire. The registry produces these from its
/// richer `Tool` entries; providers translate them to vendor formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema (subset) for the arguments object.
    pub parameters: serde_json::Value,
}

/// Static capabilities a provider advertises.
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    pub supports_streaming: bool,
    pub supports_tools: bool,
    pub max_context_tokens: u32,
}

// ============================================================================
// Provider trait
// ============================================================================

/// Adapter to one LLM vendor's API.
///
/// Implementations translate the universal message/tool shapes to the
/// vendor wire format, classify transport faults into `LlmError`, and decode
/// streams on a single producer task.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging and result attribution.
    fn name(&self) -> &str;

    /// Models this provider can serve.
    fn models(&self) -> Vec<String>;

    fn capabilities(&self) -> &ProviderCapabilities;

    /// Cheap liveness probe, honoring the caller's cancellation token.
    async fn ping(&self, ctx: &CancellationToken) -> LlmResult<()>;

    /// Blocking chat completion.
    async fn chat(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<ChatResponse>;

    /// Streaming chat completion. A spawned producer reads the wire and
    /// publishes decoded chunks; the receiver drains until a `done` chunk or
    /// channel close. Chunk order matches wire order.
    async fn chat_stream(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>>;
}
