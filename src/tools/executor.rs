//! Concurrent tool execution.
//!
//! A batch of model-requested calls runs in parallel; results come back in
//! input order regardless of completion order, so the transcript the next
//! LLM call sees is stable. Handler failures are data, not errors: they are
//! converted to tool-result payloads the model can read and recover from.

use tokio_util::sync::CancellationToken;

use super::ToolRegistry;
use crate::llm::ToolCall;

/// Outcome of one tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// Run every call in parallel and return outcomes in input order.
///
/// Unregistered tools and handler errors produce error outcomes with an
/// `Error executing tool <name>: ...` payload; they never abort the batch.
pub async fn execute_all(
    registry: &ToolRegistry,
    ctx: &CancellationToken,
    calls: &[ToolCall],
) -> Vec<ToolOutcome> {
    let futures: Vec<_> = calls
        .iter()
        .map(|call| {
            let tool = registry.get(&call.name);
            let ctx = ctx.clone();
            let call = call.clone();
            async move {
                let outcome = match tool {
                    Some(tool) => {
                        tracing::debug!(tool = %call.name, id = %call.id, "executing tool");
                        (tool.handler)(ctx, call.arguments.clone()).await
                    }
                    None => Err(anyhow::anyhow!("tool not found")),
                };
                match outcome {
                    Ok(content) => ToolOutcome {
                        tool_call_id: call.id,
                        name: call.name,
                        content,
                        is_error: false,
                    },
                    Err(e) => ToolOutcome {
                        tool_call_id: call.id,
                        content: format!("Error executing tool {}: {}", call.name, e),
                        name: call.name,
                        is_error: true,
                    },
                }
            }
        })
        .collect();

    // join_all preserves input order even though execution interleaves.
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Params, Tool};
    use std::time::Duration;

    fn registry_with_delay_tools() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Tool::new("slow", "slow echo", Params::new().build(), |_ctx, args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(format!("slow:{args}"))
            })
        }));
        registry.register(Tool::new("fast", "fast echo", Params::new().build(), |_ctx, args| {
            Box::pin(async move { Ok(format!("fast:{args}")) })
        }));
        registry.register(Tool::new("broken", "always fails", Params::new().build(), |_c, _a| {
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        }));
        registry
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall { id: id.into(), name: name.into(), arguments: args.into() }
    }

    #[tokio::test]
    async fn test_results_in_input_order() {
        let registry = registry_with_delay_tools();
        let ctx = CancellationToken::new();
        let calls = vec![call("c1", "slow", "a"), call("c2", "fast", "b")];

        let outcomes = execute_all(&registry, &ctx, &calls).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].tool_call_id, "c1");
        assert_eq!(outcomes[0].content, "slow:a");
        assert_eq!(outcomes[1].tool_call_id, "c2");
        assert_eq!(outcomes[1].content, "fast:b");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_payload() {
        let registry = registry_with_delay_tools();
        let ctx = CancellationToken::new();
        let outcomes = execute_all(&registry, &ctx, &[call("c1", "broken", "{}")]).await;

        assert!(outcomes[0].is_error);
        assert_eq!(outcomes[0].content, "Error executing tool broken: boom");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_payload() {
        let registry = registry_with_delay_tools();
        let ctx = CancellationToken::new();
        let outcomes = execute_all(&registry, &ctx, &[call("c1", "nope", "{}")]).await;

        assert!(outcomes[0].is_error);
        assert_eq!(outcomes[0].content, "Error executing tool nope: tool not found");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let registry = registry_with_delay_tools();
        let ctx = CancellationToken::new();
        assert!(execute_all(&registry, &ctx, &[]).await.is_empty());
    }
}
