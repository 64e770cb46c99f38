//! Gemini-style provider (generateContent wire format).
//!
//! The system prompt is hoisted out of the message list into
//! `system_instruction`; tools are grouped under `function_declarations`;
//! tool results travel back as user-role `functionResponse` parts with the
//! payload wrapped in `{result: ...}`. Streaming uses the `alt=sse` variant
//! of `streamGenerateContent` with `data:` prefixed lines.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::sse::{sse_data, LineBuffer};
use super::{
    ChatOptions, ChatResponse, FinishReason, Message, Provider, ProviderCapabilities, Role,
    StreamChunk, ToolCall, ToolSpec, Usage, REMOTE_TIMEOUT,
};
use crate::error::{LlmError, LlmResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    models: Vec<String>,
    capabilities: ProviderCapabilities,
}

impl GeminiProvider {
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
                max_context_tokens: 1_000_000,
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

    fn model_for(&self, opts: &ChatOptions) -> String {
        opts.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> WireRequest {
        let mut system_instruction = None;
        let mut contents: Vec<WireContent> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    // First system message wins; later ones are appended.
                    match &mut system_instruction {
                        None => {
                            system_instruction = Some(WireSystemInstruction {
                                parts: vec![WirePart::text(&msg.content)],
                            });
                        }
                        Some(si) => si.parts.push(WirePart::text(&msg.content)),
                    }
                }
                Role::User => contents.push(WireContent {
                    role: "user".to_string(),
                    parts: vec![WirePart::text(&msg.content)],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(WirePart::text(&msg.content));
                    }
                    for tc in &msg.tool_calls {
                        parts.push(WirePart {
                            function_call: Some(WireFunctionCall {
                                name: tc.name.clone(),
                                args: serde_json::from_str(&tc.arguments)
                                    .unwrap_or(serde_json::Value::Null),
                            }),
                            ..WirePart::default()
                        });
                    }
                    contents.push(WireContent { role: "model".to_string(), parts });
                }
                Role::Tool => {
                    // Tool results are user-role functionResponse parts with
                    // the payload wrapped under "result".
                    contents.push(WireContent {
                        role: "user".to_string(),
                        parts: vec![WirePart {
                            function_response: Some(WireFunctionResponse {
                                name: msg.name.clone().unwrap_or_default(),
                                response: serde_json::json!({ "result": msg.content }),
                            }),
                            ..WirePart::default()
                        }],
                    });
                }
            }
        }

        let declarations: Vec<WireFunctionDeclaration> = tools
            .iter()
            .map(|t| WireFunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();

        let generation_config = WireGenerationConfig {
            temperature: opts.temperature,
            max_output_tokens: opts.max_tokens,
            top_p: opts.top_p,
            stop_sequences: if opts.stop.is_empty() { None } else { Some(opts.stop.clone()) },
        };

        WireRequest {
            contents,
            system_instruction,
            tools: if declarations.is_empty() {
                None
            } else {
                Some(vec![WireTools { function_declarations: declarations }])
            },
            generation_config: Some(generation_config),
        }
    }

    async fn send(&self, ctx: &CancellationToken, url: String, request: &WireRequest) -> LlmResult<reqwest::Response> {
        let fut = self.client.post(&url).json(request).send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("gemini", status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn ping(&self, ctx: &CancellationToken) -> LlmResult<()> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let fut = self.client.get(&url).timeout(Duration::from_secs(10)).send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(LlmError::Cancelled),
            r = fut => r?,
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("gemini", status, &body));
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
        let model = self.model_for(opts);
        let request = self.build_request(messages, tools, opts);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let started = Instant::now();
        let response = self.send(ctx, url, &request).await?;
        let parsed: WireResponse = response.json().await?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Api { status: error.code.unwrap_or(200), message: error.message });
        }

        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| LlmError::Api {
                status: 200,
                message: "response contained no candidates".into(),
            })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                content.push_str(&text);
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCall {
                    id: format!("call_{}", Uuid::new_v4().simple()),
                    name: fc.name,
                    arguments: fc.args.to_string(),
                });
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            match candidate.finish_reason.as_deref() {
                Some(raw) => FinishReason::from_wire(raw),
                None => FinishReason::Stop,
            }
        };

        let usage = parsed
            .usage_metadata
            .map(|u| {
                Usage::new(
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
            model,
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
        let model = self.model_for(opts);
        let request = self.build_request(messages, tools, opts);
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}&alt=sse",
            self.base_url, model, self.api_key
        );
        let response = self.send(ctx, url, &request).await?;

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
                    let Ok(event) = serde_json::from_str::<WireResponse>(payload) else {
                        continue;
                    };
                    if let Some(usage) = event.usage_metadata {
                        let out = StreamChunk {
                            usage: Some(Usage::new(
                                usage.prompt_token_count.unwrap_or(0),
                                usage.candidates_token_count.unwrap_or(0),
                            )),
                            ..StreamChunk::default()
                        };
                        if tx.send(Ok(out)).await.is_err() {
                            return;
                        }
                    }
                    for candidate in event.candidates.unwrap_or_default() {
                        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                            if let Some(text) = part.text {
                                if !text.is_empty()
                                    && tx.send(Ok(StreamChunk::delta(text))).await.is_err()
                                {
                                    return;
                                }
                            }
                            if let Some(fc) = part.function_call {
                                let out = StreamChunk {
                                    tool_call: Some(ToolCall {
                                        id: format!("call_{}", Uuid::new_v4().simple()),
                                        name: fc.name,
                                        arguments: fc.args.to_string(),
                                    }),
                                    ..StreamChunk::default()
                                };
                                if tx.send(Ok(out)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        if let Some(reason) = candidate.finish_reason {
                            let out = StreamChunk {
                                finish_reason: Some(FinishReason::from_wire(&reason)),
                                ..StreamChunk::default()
                            };
                            if tx.send(Ok(out)).await.is_err() {
                                return;
                            }
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
// Wire types
// ============================================================================

#[derive(Serialize)]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTools>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize)]
struct WireSystemInstruction {
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Serialize, Default)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn text(s: &str) -> Self {
        Self { text: Some(s.to_string()), ..Self::default() }
    }
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Serialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
struct WireTools {
    #[serde(rename = "function_declarations")]
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WireResponse {
    candidates: Option<Vec<WireCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<WireUsage>,
    error: Option<WireApiError>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireContentIn>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireContentIn {
    #[serde(default)]
    parts: Vec<WirePartIn>,
}

#[derive(Deserialize)]
struct WirePartIn {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<WireFunctionCallIn>,
}

#[derive(Deserialize)]
struct WireFunctionCallIn {
    name: String,
    args: serde_json::Value,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct WireApiError {
    code: Option<u16>,
    message: String,
}
