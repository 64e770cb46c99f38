//! OpenAI-compatible provider (chat completions wire format).
//!
//! Covers api.openai.com and the many gateways that speak the same protocol.
//! System prompt travels as the first `system` role message; tools as
//! `{type: "function", function: {...}}`; streaming is SSE with `data:`
//! prefixed lines terminated by `[DONE]`.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    models: Vec<String>,
    capabilities: ProviderCapabilities,
}

impl OpenAiProvider {
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
                max_context_tokens: 128_000,
            },
        }
    }

    /// Point at an OpenAI-compatible gateway instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    fn model_for(&self, opts: &ChatOptions) -> String {
        opts.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
        stream: bool,
    ) -> WireRequest {
        let wire_messages = messages.iter().map(WireMessage::from).collect();
        let wire_tools: Vec<WireTool> = tools
            .iter()
            .map(|t| WireTool {
                tool_type: "function".to_string(),
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();

        WireRequest {
            model: self.model_for(opts),
            messages: wire_messages,
            tools: if wire_tools.is_empty() { None } else { Some(wire_tools) },
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            top_p: opts.top_p,
            stop: if opts.stop.is_empty() { None } else { Some(opts.stop.clone()) },
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
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            return Err(LlmError::from_status("openai", status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn ping(&self, ctx: &CancellationToken) -> LlmResult<()> {
        let fut = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(10))
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("openai", status, &body));
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

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| LlmError::Api {
                status: 200,
                message: "response contained no choices".into(),
            })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some(raw) => FinishReason::from_wire(raw),
            None if !tool_calls.is_empty() => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };

        let usage = parsed
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
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
                    let Some(payload) = sse_data(&line) else { continue };
                    if payload == "[DONE]" {
                        let _ = tx.send(Ok(StreamChunk::done())).await;
                        return;
                    }
                    let Ok(event) = serde_json::from_str::<WireStreamChunk>(payload) else {
                        continue;
                    };
                    for out in decode_stream_event(event) {
                        if tx.send(Ok(out)).await.is_err() {
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

/// Expand one SSE event into zero or more chunks. OpenAI-compatible servers
/// emit each tool call as a single fragment with id and name present.
fn decode_stream_event(event: WireStreamChunk) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    if let Some(usage) = event.usage {
        out.push(StreamChunk {
            usage: Some(Usage::new(usage.prompt_tokens, usage.completion_tokens)),
            ..StreamChunk::default()
        });
    }
    for choice in event.choices.unwrap_or_default() {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    out.push(StreamChunk::delta(content));
                }
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let (Some(id), Some(function)) = (tc.id, tc.function) else { continue };
                let Some(name) = function.name else { continue };
                out.push(StreamChunk {
                    tool_call: Some(ToolCall {
                        id,
                        name,
                        arguments: function.arguments.unwrap_or_else(|| "{}".into()),
                    }),
                    ..StreamChunk::default()
                });
            }
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamChunk {
                finish_reason: Some(FinishReason::from_wire(&reason)),
                ..StreamChunk::default()
            });
        }
    }
    out
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| WireToolCall {
                        id: tc.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        } else {
            None
        };

        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// Argument JSON as a string, exactly as the vendor encodes it.
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Option<Vec<WireChoice>>,
    usage: Option<WireUsage>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    choices: Option<Vec<WireStreamChoice>>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: Option<WireStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Deserialize)]
struct WireStreamToolCall {
    id: Option<String>,
    function: Option<WireStreamFunction>,
}

#[derive(Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
