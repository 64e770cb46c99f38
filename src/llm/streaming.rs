//! Stream consumption helpers.
//!
//! `chat_stream` hands back a channel of decoded chunks; callers that only
//! want the final answer (or need to tool-loop over a streaming provider)
//! drain it here. Chunk order is wire order: a single producer task reads
//! the response body, so no reordering can happen upstream.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::{ChatResponse, FinishReason, StreamChunk, ToolCall, Usage};
use crate::error::{LlmError, LlmResult};

/// Drain a chunk stream into a complete `ChatResponse`.
///
/// Content deltas concatenate in arrival order; tool calls and usage are
/// taken as emitted; the finish reason defaults from the presence of tool
/// calls when the stream never named one. A mid-stream error aborts with
/// that error.
pub async fn collect(
    mut rx: mpsc::Receiver<LlmResult<StreamChunk>>,
    model: impl Into<String>,
    provider: impl Into<String>,
) -> LlmResult<ChatResponse> {
    let started = Instant::now();
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut finish_reason: Option<FinishReason> = None;
    let mut usage = Usage::default();

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        content.push_str(&chunk.content_delta);
        if let Some(call) = chunk.tool_call {
            tool_calls.push(call);
        }
        if let Some(reason) = chunk.finish_reason {
            finish_reason = Some(reason);
        }
        if let Some(u) = chunk.usage {
            usage.add(u);
        }
        if chunk.done {
            break;
        }
    }

    let finish_reason = finish_reason.unwrap_or(if tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolCalls
    });

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
        model: model.into(),
        provider: provider.into(),
        latency: started.elapsed(),
    })
}

/// Drain with a wall-clock bound on the whole stream. Slow-token stalls are
/// the common failure mode of local models; this turns them into a
/// classified timeout instead of a hung caller.
pub async fn collect_with_timeout(
    rx: mpsc::Receiver<LlmResult<StreamChunk>>,
    model: impl Into<String>,
    provider: impl Into<String>,
    timeout: Duration,
) -> LlmResult<ChatResponse> {
    let provider = provider.into();
    match tokio::time::timeout(timeout, collect(rx, model, provider.clone())).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::ProviderDown {
            provider,
            message: format!("stream stalled past {}s", timeout.as_secs()),
        }),
    }
}
