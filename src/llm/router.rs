//! Multi-provider router: retry, fallback chain, complexity-aware model
//! selection, and a concurrent health check.
//!
//! The router implements `Provider` itself, so any consumer written against
//! the provider contract can hold a single vendor or a whole chain without
//! knowing the difference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    ChatOptions, ChatResponse, Message, Provider, ProviderCapabilities, StreamChunk, ToolSpec,
};
use crate::error::{LlmError, LlmResult};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Request complexity tag for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Router tuning. `complexity_models` fills `opts.model` only when the
/// caller left it unset.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub complexity_models: HashMap<Complexity, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            complexity_models: HashMap::new(),
        }
    }
}

pub struct Router {
    primary: Arc<dyn Provider>,
    fallbacks: Vec<Arc<dyn Provider>>,
    config: RouterConfig,
    name: String,
    capabilities: ProviderCapabilities,
}

impl Router {
    pub fn new(
        primary: Arc<dyn Provider>,
        fallbacks: Vec<Arc<dyn Provider>>,
        config: RouterConfig,
    ) -> Self {
        let name = format!("router/{}", primary.name());
        // The primary never appears twice in the chain.
        let fallbacks: Vec<_> = fallbacks
            .into_iter()
            .filter(|p| p.name() != primary.name())
            .collect();
        let capabilities = primary.capabilities().clone();
        Self { primary, fallbacks, config, name, capabilities }
    }

    /// Providers in dispatch order: primary first, then fallbacks.
    fn chain(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Tag a request with a complexity level; the mapped model is used only
    /// if the caller did not already pick one.
    pub async fn chat_with_complexity(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
        complexity: Complexity,
    ) -> LlmResult<ChatResponse> {
        let mut opts = opts.clone();
        if opts.model.is_none() {
            if let Some(model) = self.config.complexity_models.get(&complexity) {
                opts.model = Some(model.clone());
            }
        }
        self.chat(ctx, messages, tools, &opts).await
    }

    /// Ping every registered provider concurrently. `None` means healthy;
    /// `Some(message)` carries the failure. Inspection only, not dispatch.
    pub async fn health_check(&self, ctx: &CancellationToken) -> HashMap<String, Option<String>> {
        let futures: Vec<_> = self
            .chain()
            .map(|provider| {
                let provider = provider.clone();
                let ctx = ctx.clone();
                async move {
                    let outcome =
                        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, provider.ping(&ctx)).await;
                    let err = match outcome {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(_) => Some("health check timed out".to_string()),
                    };
                    (provider.name().to_string(), err)
                }
            })
            .collect();

        futures::future::join_all(futures).await.into_iter().collect()
    }

    /// Call one provider with bounded linear-backoff retries. Returns
    /// `Err((error, non_retryable))`.
    async fn call_with_retries(
        &self,
        provider: &Arc<dyn Provider>,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> Result<ChatResponse, (LlmError, bool)> {
        let attempts = self.config.max_retries.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * attempt as u32;
                tokio::select! {
                    _ = ctx.cancelled() => return Err((LlmError::Cancelled, true)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match provider.chat(ctx, messages, tools, opts).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        provider = provider.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "retryable provider error"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err((e, true)),
            }
        }

        Err((last_err.expect("at least one attempt"), false))
    }
}

#[async_trait]
impl Provider for Router {
    fn name(&self) -> &str {
        &self.name
    }

    /// Union of all registered providers' models, first occurrence wins.
    fn models(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut models = Vec::new();
        for provider in self.chain() {
            for model in provider.models() {
                if seen.insert(model.clone()) {
                    models.push(model);
                }
            }
        }
        models
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn ping(&self, ctx: &CancellationToken) -> LlmResult<()> {
        self.primary.ping(ctx).await
    }

    async fn chat(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<ChatResponse> {
        let mut last_err = None;

        for provider in self.chain() {
            if ctx.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            match self.call_with_retries(provider, ctx, messages, tools, opts).await {
                Ok(response) => return Ok(response),
                // Non-retryable kinds short-circuit the whole chain.
                Err((e, true)) => return Err(e),
                Err((e, false)) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "provider exhausted retries, falling through"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(LlmError::AllProvidersFailed {
            last: Box::new(last_err.unwrap_or(LlmError::ProviderDown {
                provider: self.name.clone(),
                message: "no providers registered".into(),
            })),
        })
    }

    /// Streaming falls back at connection time only: once a provider has
    /// produced a receiver, its stream is the stream.
    async fn chat_stream(
        &self,
        ctx: &CancellationToken,
        messages: &[Message],
        tools: &[ToolSpec],
        opts: &ChatOptions,
    ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>> {
        let mut last_err = None;
        for provider in self.chain() {
            if ctx.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            match provider.chat_stream(ctx, messages, tools, opts).await {
                Ok(rx) => return Ok(rx),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(provider = provider.name(), error = %e, "stream open failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(LlmError::AllProvidersFailed {
            last: Box::new(last_err.unwrap_or(LlmError::ProviderDown {
                provider: self.name.clone(),
                message: "no providers registered".into(),
            })),
        })
    }
}
