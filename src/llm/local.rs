//! Local cooperative provider (Ollama-style wire format).
//!
//! Same message and tool shapes as OpenAI-compatible servers, but the
//! endpoint is `/api/chat`, streaming is NDJSON (one JSON object per line,
//! `done: true` terminator), and tool calls carry no ids on the wire, so we
//! synthesize them.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::sse::LineBuffer;
use super::{
    ChatOptions, ChatResponse, FinishReason, Message, Provider, ProviderCapabilities, Role,
    StreamChunk, ToolCall, ToolSpec, Usage, LOCAL_TIMEOUT,
};
use crate::error::{LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct LocalProvider {
    client: Client,
    base_url: String,
    default_model: String,
    models: Vec<String>,
    capabilities: ProviderCapabilities,
}

impl LocalProvider {
    pub fn new(default_model: impl Into<String>) -> Self {
        let default_model = default_model.into();
        Self {
            client: Client::builder()
                .timeout(LOCAL_TIMEOUT)
                .build()
                .expect("reqwest client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: vec![default_model.clone()],
            default_model,
            capabilities: ProviderCapabilities {
                supports_streaming: true,
                supports_tools: true,
                max_context_tokens: 32_000,
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

        let options = WireOptions {
            temperature: opts.temperature,
            num_predict: opts.max_tokens,
            top_p: opts.top_p,
            stop: if opts.stop.is_empty() { None } else { Some(opts.stop.clone()) },
        };

        WireRequest {
            model: opts.model.clone().unwrap_or_else(|| self.default_model.clone()),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: if wire_tools.is_empty() { None } else { Some(wire_tools) },
            options,
            stream,
        }
    }

    async fn send(
        &self,
        ctx: &CancellationToken,
        request: &WireRequest,
    ) -> LlmResult<reqwest::Response> {
        let fut = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("local", status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
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
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(10))
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(LlmError::ProviderDown {
                provider: "local".into(),
                message: format!("tags endpoint returned {}", status),
            });
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

        let message = parsed.message.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolCall::from)
            .collect();

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            match parsed.done_reason.as_deref() {
                Some(raw) => FinishReason::from_wire(raw),
                None => FinishReason::Stop,
            }
        };

        Ok(ChatResponse {
            content: message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
            usage: Usage::new(
                parsed.prompt_eval_count.unwrap_or(0),
                parsed.eval_count.unwrap_or(0),
            ),
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

                // NDJSON: every line is a complete object, no prefix.
                while let Some(line) = buffer.next_line() {
                    if line.is_empty() {
                        continue;
                    }
                    let Ok(event) = serde_json::from_str::<WireResponse>(&line) else {
                        continue;
                    };
                    let done = event.done.unwrap_or(false);
                    if let Some(message) = event.message {
                        if let Some(content) = message.content {
                            if !content.is_empty()
                                && tx.send(Ok(StreamChunk::delta(content))).await.is_err()
                            {
                                return;
                            }
                        }
                        for tc in message.tool_calls.unwrap_or_default() {
                            let out = StreamChunk {
                                tool_call: Some(ToolCall::from(tc)),
                                ..StreamChunk::default()
                            };
                            if tx.send(Ok(out)).await.is_err() {
                                return;
                            }
                        }
                    }
                    if done {
                        let usage = Usage::new(
                            event.prompt_eval_count.unwrap_or(0),
                            event.eval_count.unwrap_or(0),
                        );
                        let _ = tx
                            .send(Ok(StreamChunk {
                                usage: Some(usage),
                                done: true,
                                ..StreamChunk::default()
                            }))
                            .await;
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }
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
    options: WireOptions,
    stream: bool,
}

#[derive(Serialize)]
struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallOut>>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| WireToolCallOut {
                        function: WireFunctionCallOut {
                            name: tc.name.clone(),
                            arguments: serde_json::from_str(&tc.arguments)
                                .unwrap_or(serde_json::Value::Null),
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

#[derive(Serialize)]
struct WireToolCallOut {
    function: WireFunctionCallOut,
}

#[derive(Serialize)]
struct WireFunctionCallOut {
    name: String,
    /// The local wire format carries arguments as an object, not a string.
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    message: Option<WireResponseMessage>,
    done: Option<bool>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize, Default)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCallIn>>,
}

#[derive(Deserialize)]
struct WireToolCallIn {
    function: WireFunctionCallIn,
}

#[derive(Deserialize)]
struct WireFunctionCallIn {
    name: String,
    arguments: serde_json::Value,
}

impl From<WireToolCallIn> for ToolCall {
    fn from(tc: WireToolCallIn) -> Self {
        ToolCall {
            // No id on this wire format; synthesize one so the tool loop can
            // pair results with calls.
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: tc.function.name,
            arguments: tc.function.arguments.to_string(),
        }
    }
}
