//! Anthropic-style provider (messages wire format).
//!
//! The system prompt is a top-level `system` field; tool schemas use
//! `input_schema`; assistant tool calls are `tool_use` content blocks and
//! tool results are `tool_result` blocks inside a user-role message
//! (consecutive tool messages collapse into one user turn). Streaming is a
//! named-event SSE protocol: tool call arguments arrive as
//! `input_json_delta` fragments that must be accumulated per block index
//! until the block's stop event.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::sse::{sse_data, LineBuffer};
use super::{
    ChatOptions, ChatResponse, FinishReason, Message, Provider, ProviderCapabilities, Role,
    StreamChunk, ToolCall, ToolSpec, Usage, REMOTE_TIMEOUT,
};
use crate::error::{LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
/// The wire format requires max_tokens; used when the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    models: Vec<String>,
    capabilities: ProviderCapabilities,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        Self {
            client: Client::builder()
                .timeout(REMOTE_TIMEOUT)
                .build()
                .expect("reqwest client"),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: vec![default_model.clone()],
            default_model,
            capabilities: ProviderCapabilities {
                supports_streaming: true,
                supports_tools: true,
                max_context_tokens: 200_000,
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
        stream: bool,
    ) -> WireRequest {
        let mut system = None;
        let mut wire_messages: Vec<WireMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    let text = msg.content.clone();
                    system = Some(match system.take() {
                        None => text,
                        Some(prev) => format!("{}\n\n{}", prev, text),
                    });
                }
                Role::User => wire_messages.push(WireMessage {
                    role: "user".to_string(),
                    content: vec![WireBlock::text(&msg.content)],
                }),
                Role::Assistant => {
                    let mut content = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(WireBlock::text(&msg.content));
                    }
                    for tc in &msg.tool_calls {
                        content.push(WireBlock {
                            block_type: "tool_use".to_string(),
                            text: None,
                            id: Some(tc.id.clone()),
                            name: Some(tc.name.clone()),
                            input: Some(
                                serde_json::from_str(&tc.arguments)
                                    .unwrap_or(serde_json::Value::Null),
                            ),
                            tool_use_id: None,
                            content: None,
                        });
                    }
                    wire_messages.push(WireMessage { role: "assistant".to_string(), content });
                }
                Role::Tool => {
                    let block = WireBlock {
                        block_type: "tool_result".to_string(),
                        text: None,
                        id: None,
                        name: None,
                        input: None,
                        tool_use_id: msg.tool_call_id.clone(),
                        content: Some(msg.content.clone()),
                    };
                    // Consecutive tool results share one user turn.
                    match wire_messages.last_mut() {
                        Some(last)
                            if last.role == "user"
                                && last
                                    .content
                                    .iter()
                                    .all(|b| b.block_type == "tool_result") =>
                        {
                            last.content.push(block)
                        }
                        _ => wire_messages.push(WireMessage {
                            role: "user".to_string(),
                            content: vec![block],
                        }),
                    }
                }
            }
        }

        let wire_tools: Vec<WireTool> = tools
            .iter()
            .map(|t| WireTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect();

        WireRequest {
            model: opts.model.clone().unwrap_or_else(|| self.default_model.clone()),
            max_tokens: opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: wire_messages,
            system,
            tools: if wire_tools.is_empty() { None } else { Some(wire_tools) },
            temperature: opts.temperature,
            top_p: opts.top_p,
            stop_sequences: if opts.stop.is_empty() { None } else { Some(opts.stop.clone()) },
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn send(
        &self,
        ctx: &CancellationToken,
        request: &WireRequest,
    ) -> LlmResult<reqwest::Response> {
        let fut = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("anthropic", status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn ping(&self, ctx: &CancellationToken) -> LlmResult<()> {
        let request = WireRequest {
            model: self.default_model.clone(),
            max_tokens: 1,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: vec![WireBlock::text("ping")],
            }],
            system: None,
            tools: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
        };

        let fut = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .timeout(Duration::from_secs(10))
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("anthropic", status, &body));
        }
        Ok(())
    }

    async fn chat(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<ChatResponse> {
        let request = self.build_request(messages, tools, opts, false);
        let started = Instant::now();
        let response = self.send(ctx, &request).await?;
        let parsed: WireResponse = response.json().await?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Api { status: 200, message: error.message });
        }

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content.unwrap_or_default() {
            match block.block_type.as_deref() {
                Some("text") => {
                    if let Some(text) = block.text {
                        content.push_str(&text);
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block.id.unwrap_or_default(),
                        name: block.name.unwrap_or_default(),
                        arguments: block
                            .input
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".into()),
                    });
                }
                _ => {}
            }
        }

        let finish_reason = match parsed.stop_reason.as_deref() {
            Some(raw) => FinishReason::from_wire(raw),
            None if !tool_calls.is_empty() => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        let usage = parsed
            .usage
            .map(|u| Usage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0)))
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
            model: request.model,
            provider: self.name().to_string(),
            latency: started.elapsed(),
        })
    }

    async fn chat_stream(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>> {
        let request = self.build_request(messages, tools, opts, true);
        let response = self.send(ctx, &request).await?;

        let (tx, rx) = mpsc::channel(64);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = LineBuffer::new();
            let mut assembler = BlockAssembler::default();

            loop {
                let chunk = tokio::select! {
                    _ = ctx.cancelled() => {
                        let _ = tx.send(Err(LlmError::Cancelled)).await;
                        return;
                    }
                    c = stream.next() => c,
                };
                let chunk = match chunk {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                    None => break,
                };
                buffer.push(&chunk);

                while let Some(line) = buffer.next_line() {
                    if line.is_empty() {
                        continue;
                    }
                    // Event-name lines only label the next data line; all the
                    // information we need is in the data payload's "type".
                    let Some(payload) = sse_data(&line) else { continue };
                    let Ok(event) = serde_json::from_str::<WireStreamEvent>(payload) else {
                        continue;
                    };
                    for out in assembler.feed(event) {
                        let done = out.done;
                        if tx.send(Ok(out)).await.is_err() {
                            return;
                        }
                        if done {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }
}

// ============================================================================
// Stream assembly
// ============================================================================

/// Per-block accumulation state for a streaming response.
///
/// Text blocks emit deltas immediately; tool_use blocks buffer their
/// `input_json_delta` fragments by block index and emit one ToolCall at
/// `content_block_stop`.
#[derive(Default)]
struct BlockAssembler {
    /// index -> (id, name, partial input JSON)
    pending_tools: std::collections::HashMap<u32, (String, String, String)>,
    text_blocks: std::collections::HashSet<u32>,
}

impl BlockAssembler {
    fn feed(&mut self, event: WireStreamEvent) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        match event.event_type.as_str() {
            "content_block_start" => {
                let index = event.index.unwrap_or(0);
                if let Some(block) = event.content_block {
                    match block.block_type.as_deref() {
                        Some("tool_use") => {
                            self.pending_tools.insert(
                                index,
                                (
                                    block.id.unwrap_or_default(),
                                    block.name.unwrap_or_default(),
                                    String::new(),
                                ),
                            );
                        }
                        Some("text") => {
                            self.text_blocks.insert(index);
                        }
                        _ => {}
                    }
                }
            }
            "content_block_delta" => {
                let index = event.index.unwrap_or(0);
                if let Some(delta) = event.delta {
                    match delta.delta_type.as_deref() {
                        Some("text_delta") => {
                            if self.text_blocks.contains(&index) {
                                if let Some(text) = delta.text {
                                    out.push(StreamChunk::delta(text));
                                }
                            }
                        }
                        Some("input_json_delta") => {
                            if let (Some(entry), Some(partial)) =
                                (self.pending_tools.get_mut(&index), delta.partial_json)
                            {
                                entry.2.push_str(&partial);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "content_block_stop" => {
                let index = event.index.unwrap_or(0);
                self.text_blocks.remove(&index);
                if let Some((id, name, input)) = self.pending_tools.remove(&index) {
                    let arguments = if input.is_empty() { "{}".to_string() } else { input };
                    out.push(StreamChunk {
                        tool_call: Some(ToolCall { id, name, arguments }),
                        ..StreamChunk::default()
                    });
                }
            }
            "message_delta" => {
                if let Some(delta) = event.delta {
                    if let Some(reason) = delta.stop_reason {
                        out.push(StreamChunk {
                            finish_reason: Some(FinishReason::from_wire(&reason)),
                            ..StreamChunk::default()
                        });
                    }
                }
                if let Some(usage) = event.usage {
                    out.push(StreamChunk {
                        usage: Some(Usage::new(
                            usage.input_tokens.unwrap_or(0),
                            usage.output_tokens.unwrap_or(0),
                        )),
                        ..StreamChunk::default()
                    });
                }
            }
            "message_stop" => out.push(StreamChunk::done()),
            _ => {}
        }
        out
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: Vec<WireBlock>,
}

#[derive(Serialize)]
struct WireBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_use_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl WireBlock {
    fn text(s: &str) -> Self {
        Self {
            block_type: "text".to_string(),
            text: Some(s.to_string()),
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Option<Vec<WireBlockIn>>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
    error: Option<WireApiError>,
}

#[derive(Deserialize)]
struct WireBlockIn {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireApiError {
    message: String,
}

#[derive(Deserialize)]
struct WireStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    index: Option<u32>,
    content_block: Option<WireBlockIn>,
    delta: Option<WireStreamDelta>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireStreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    partial_json: Option<String>,
    stop_reason: Option<String>,
}
