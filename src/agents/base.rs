//! Base agent lifecycle shared by every specialist.
//!
//! An agent is a bound tuple of provider handle, system prompt, tool
//! registry and conversation memory. It is constructed once at startup and
//! reused for every task; the only mutation between tasks is its memory.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::memory::{ConversationMemory, DEFAULT_KEEP_RECENT, DEFAULT_MEMORY_SIZE};
use super::{AgentResult, AgentRole, AnalysisResult};
use crate::error::{LlmError, LlmResult};
use crate::llm::{ChatOptions, Message, Provider};
use crate::tools::{run_tool_loop, ToolRegistry, DEFAULT_MAX_ITERATIONS};

/// Per-agent tuning.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub memory_size: usize,
    pub keep_recent: usize,
    pub max_tool_iterations: usize,
    pub chat_options: ChatOptions,
    /// Attempt structured-result extraction from the final answer.
    pub extract_analysis: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            keep_recent: DEFAULT_KEEP_RECENT,
            max_tool_iterations: DEFAULT_MAX_ITERATIONS,
            chat_options: ChatOptions::default(),
            extract_analysis: false,
        }
    }
}

pub struct Agent {
    name: String,
    role: AgentRole,
    system_prompt: String,
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    memory: ConversationMemory,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        system_prompt: impl Into<String>,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let memory = ConversationMemory::new(config.memory_size, config.keep_recent);
        Self {
            name: name.into(),
            role,
            system_prompt: system_prompt.into(),
            provider,
            registry,
            memory,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run a task against this agent's own memory.
    pub async fn process(&self, ctx: &CancellationToken, task: &str) -> LlmResult<AgentResult> {
        // Summarization happens between tasks, never inside the tool loop.
        if self.memory.needs_summarization().await {
            if let Err(e) = self.summarize_memory(ctx).await {
                tracing::warn!(agent = %self.name, error = %e, "memory summarization failed");
            }
        }
        let history = self.memory.messages().await;
        self.run(ctx, task, &history, true).await
    }

    /// Run a task against caller-supplied history instead of memory.
    pub async fn process_with_history(
        &self,
        ctx: &CancellationToken,
        task: &str,
        history: &[Message],
    ) -> LlmResult<AgentResult> {
        self.run(ctx, task, history, false).await
    }

    async fn run(
        &self,
        ctx: &CancellationToken,
        task: &str,
        history: &[Message],
        commit_to_memory: bool,
    ) -> LlmResult<AgentResult> {
        let started = Instant::now();

        // The system prompt is prepended fresh on every invocation; it never
        // lives in memory.
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(task));
        let new_messages_start = messages.len() - 1;

        let outcome = run_tool_loop(
            self.provider.as_ref(),
            &self.registry,
            ctx,
            &messages,
            &self.config.chat_options,
            self.config.max_tool_iterations,
        )
        .await;

        let result = match outcome {
            Ok(r) => r,
            Err(failure) => {
                tracing::warn!(agent = %self.name, error = %failure.error, "tool loop failed");
                return Err(failure.error);
            }
        };

        let tool_call_count: usize =
            result.transcript.iter().map(|m| m.tool_calls.len()).sum();

        if commit_to_memory {
            self.memory
                .add(result.transcript[new_messages_start..].iter().cloned())
                .await;
        }

        let analysis = if self.config.extract_analysis {
            Some(AnalysisResult::extract(
                &result.response.content,
                AnalysisResult::default(),
            ))
        } else {
            None
        };

        tracing::info!(
            agent = %self.name,
            tool_calls = tool_call_count,
            iterations = result.iterations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent task complete"
        );

        Ok(AgentResult {
            agent_name: self.name.clone(),
            role: self.role,
            content: result.response.content,
            analysis,
            tool_call_count,
            tokens: result.usage,
            duration: started.elapsed(),
            // Full transcript minus the system prompt.
            messages: result.transcript[1..].to_vec(),
            error: None,
        })
    }

    /// Compress old memory through the agent's own provider. Cancellable,
    /// and the memory lock is not held across the provider call.
    async fn summarize_memory(&self, ctx: &CancellationToken) -> LlmResult<()> {
        let provider = self.provider.clone();
        let opts = self.config.chat_options.clone();
        self.memory
            .summarize(|batch| async move {
                let mut text = String::new();
                for msg in &batch {
                    text.push_str(msg.role.as_str());
                    text.push_str(": ");
                    text.push_str(&msg.content);
                    text.push('\n');
                }
                let prompt = vec![
                    Message::system(
                        "Summarize the following conversation in a compact paragraph. \
                         Preserve tickers, figures, verdicts and open questions.",
                    ),
                    Message::user(text),
                ];
                let response = provider.chat(ctx, &prompt, &[], &opts).await?;
                Ok::<_, LlmError>(response.content)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        ChatResponse, FinishReason, ProviderCapabilities, StreamChunk, ToolCall, ToolSpec, Usage,
    };
    use crate::tools::{Params, Tool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct ScriptedProvider {
        script: tokio::sync::Mutex<Vec<ChatResponse>>,
        calls: AtomicUsize,
        capabilities: ProviderCapabilities,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                script: tokio::sync::Mutex::new(script),
                calls: AtomicUsize::new(0),
                capabilities: ProviderCapabilities {
                    supports_streaming: false,
                    supports_tools: true,
                    max_context_tokens: 8192,
                },
            })
        }
    }

    fn answer(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Usage::new(10, 5),
            model: "test".into(),
            provider: "scripted".into(),
            latency: std::time::Duration::ZERO,
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> Vec<String> {
            vec![]
        }
        fn capabilities(&self) -> &ProviderCapabilities {
            &self.capabilities
        }
        async fn ping(&self, _ctx: &CancellationToken) -> LlmResult<()> {
            Ok(())
        }
        async fn chat(
            &self,
            _ctx: &CancellationToken,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _opts: &ChatOptions,
        ) -> LlmResult<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().await;
            if script.is_empty() {
                Ok(answer("fallback"))
            } else {
                Ok(script.remove(0))
            }
        }
        async fn chat_stream(
            &self,
            _ctx: &CancellationToken,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _opts: &ChatOptions,
        ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>> {
            unimplemented!()
        }
    }

    fn quote_registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(Tool::new(
            "get_quote",
            "Latest quote",
            Params::new().required("ticker", crate::tools::string("symbol")).build(),
            |_ctx, _args| Box::pin(async { Ok("2840.50".to_string()) }),
        ));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_process_with_tools() {
        let provider = ScriptedProvider::new(vec![
            ChatResponse {
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "get_quote".into(),
                    arguments: r#"{"ticker":"RELIANCE"}"#.into(),
                }],
                finish_reason: FinishReason::ToolCalls,
                ..answer("")
            },
            answer("RELIANCE trades at 2840.50"),
        ]);
        let agent = Agent::new(
            "quoter",
            AgentRole::Technical,
            "You answer quote questions.",
            provider,
            quote_registry(),
            AgentConfig::default(),
        );

        let ctx = CancellationToken::new();
        let result = agent.process(&ctx, "Price of RELIANCE?").await.unwrap();

        assert_eq!(result.content, "RELIANCE trades at 2840.50");
        assert_eq!(result.tool_call_count, 1);
        // user, assistant-call, tool-result, assistant-final; no system.
        assert_eq!(result.messages.len(), 4);
        assert_eq!(result.tokens.total_tokens, 30);
        // Memory picked up the new turns.
        assert_eq!(agent.memory().len().await, 4);
    }

    #[tokio::test]
    async fn test_memory_threaded_into_next_task() {
        let provider = ScriptedProvider::new(vec![answer("first"), answer("second")]);
        let agent = Agent::new(
            "memo",
            AgentRole::Generalist,
            "prompt",
            provider,
            Arc::new(ToolRegistry::new()),
            AgentConfig::default(),
        );

        let ctx = CancellationToken::new();
        agent.process(&ctx, "task one").await.unwrap();
        let result = agent.process(&ctx, "task two").await.unwrap();

        // Second transcript carries the first exchange.
        assert_eq!(result.messages.len(), 4);
        assert_eq!(result.messages[0].content, "task one");
        assert_eq!(result.messages[1].content, "first");
    }

    #[tokio::test]
    async fn test_process_with_history_bypasses_memory() {
        let provider = ScriptedProvider::new(vec![answer("reply")]);
        let agent = Agent::new(
            "stateless",
            AgentRole::Generalist,
            "prompt",
            provider,
            Arc::new(ToolRegistry::new()),
            AgentConfig::default(),
        );

        let ctx = CancellationToken::new();
        let history = vec![Message::user("earlier"), Message::assistant("noted")];
        let result = agent.process_with_history(&ctx, "now", &history).await.unwrap();

        assert_eq!(result.messages.len(), 4);
        assert!(agent.memory().is_empty().await);
    }

    #[tokio::test]
    async fn test_summarization_bounds_memory() {
        let provider = ScriptedProvider::new(vec![answer("summary text")]);
        let config = AgentConfig { memory_size: 4, keep_recent: 2, ..Default::default() };
        let agent = Agent::new(
            "bounded",
            AgentRole::Generalist,
            "prompt",
            provider,
            Arc::new(ToolRegistry::new()),
            config,
        );

        // Overfill memory directly, then let process trigger summarization.
        agent
            .memory()
            .add((0..8).map(|i| Message::user(format!("old {i}"))))
            .await;
        let ctx = CancellationToken::new();
        agent.process(&ctx, "new task").await.unwrap();

        // keep_recent survivors + the new task exchange.
        assert_eq!(agent.memory().len().await, 4);
        let window = agent.memory().messages().await;
        assert!(window[0].content.contains("summary text"));
    }

    #[tokio::test]
    async fn test_analysis_extraction_enabled() {
        let provider = ScriptedProvider::new(vec![answer(
            r#"{"ticker": "TCS", "verdict": "BUY", "confidence": 70}"#,
        )]);
        let config = AgentConfig { extract_analysis: true, ..Default::default() };
        let agent = Agent::new(
            "analyst",
            AgentRole::Fundamental,
            "prompt",
            provider,
            Arc::new(ToolRegistry::new()),
            config,
        );

        let ctx = CancellationToken::new();
        let result = agent.process(&ctx, "Analyze TCS").await.unwrap();
        let analysis = result.analysis.unwrap();
        assert_eq!(analysis.verdict, "BUY");
        assert_eq!(analysis.confidence, 70.0);
    }
}
