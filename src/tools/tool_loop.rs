//! Bounded tool-calling loop.
//!
//! Alternates LLM calls and concurrent tool execution until the model
//! answers without requesting tools, the iteration cap is hit, or a provider
//! error / cancellation aborts the run. The iteration cap is the only guard
//! against a model that keeps requesting tools indefinitely.

use tokio_util::sync::CancellationToken;

use super::{execute_all, ToolRegistry};
use crate::error::LlmError;
use crate::llm::{ChatOptions, ChatResponse, Message, Provider, Usage};

/// Default iteration cap; agents override per role.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Successful tool-loop run.
#[derive(Debug)]
pub struct ToolLoopResult {
    /// The model's final, tool-free response.
    pub response: ChatResponse,
    /// Complete transcript: caller messages plus every assistant tool-call
    /// turn, every tool result, and the final assistant answer.
    pub transcript: Vec<Message>,
    /// Usage accumulated across all LLM calls in the loop.
    pub usage: Usage,
    /// Total tool calls executed.
    pub tool_call_count: usize,
    /// LLM round-trips performed.
    pub iterations: usize,
}

/// Failed run, carrying the partial transcript so callers can audit how far
/// the loop got.
#[derive(Debug)]
pub struct ToolLoopFailure {
    pub error: LlmError,
    pub transcript: Vec<Message>,
}

impl std::fmt::Display for ToolLoopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ToolLoopFailure {}

/// Run the bounded LLM <-> tools iteration.
///
/// Per round: call the provider; if the response carries tool calls, append
/// the assistant turn, execute all calls concurrently, append one tool
/// message per result (input order, original tool_call_id), and go again.
/// Provider errors abort immediately; handler errors are injected into the
/// transcript as recoverable tool results.
pub async fn run_tool_loop(
    provider: &dyn Provider,
    registry: &ToolRegistry,
    ctx: &CancellationToken,
    messages: &[Message],
    opts: &ChatOptions,
    max_iterations: usize,
) -> Result<ToolLoopResult, ToolLoopFailure> {
    let tools = registry.specs();
    let mut transcript = messages.to_vec();
    let mut usage = Usage::default();
    let mut tool_call_count = 0usize;

    for iteration in 0..max_iterations {
        if ctx.is_cancelled() {
            return Err(ToolLoopFailure { error: LlmError::Cancelled, transcript });
        }

        let response = match provider.chat(ctx, &transcript, &tools, opts).await {
            Ok(r) => r,
            Err(error) => return Err(ToolLoopFailure { error, transcript }),
        };
        usage.add(response.usage);

        if response.tool_calls.is_empty() {
            tracing::debug!(
                iterations = iteration + 1,
                tool_calls = tool_call_count,
                "tool loop complete"
            );
            transcript.push(Message::assistant(response.content.clone()));
            return Ok(ToolLoopResult {
                response,
                transcript,
                usage,
                tool_call_count,
                iterations: iteration + 1,
            });
        }

        tracing::debug!(
            iteration = iteration + 1,
            count = response.tool_calls.len(),
            tools = ?response.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "model requested tools"
        );

        transcript.push(Message::assistant_tool_calls(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        let outcomes = execute_all(registry, ctx, &response.tool_calls).await;
        tool_call_count += outcomes.len();
        for outcome in outcomes {
            transcript.push(Message::tool_result(
                outcome.tool_call_id,
                outcome.name,
                outcome.content,
            ));
        }
    }

    Err(ToolLoopFailure {
        error: LlmError::ToolLoopExceeded { max_iterations },
        transcript,
    })
}
