//! Shared test doubles: scripted providers and a seeded market data source.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use niveshak::data::{Bar, Financials, NewsItem, OptionChain, OptionStrike, Quote, StaticDataSource};
use niveshak::error::{LlmError, LlmResult};
use niveshak::llm::{
    ChatOptions, ChatResponse, FinishReason, Message, Provider, ProviderCapabilities, Role,
    StreamChunk, ToolSpec, Usage,
};
use niveshak::ToolCall;

/// Route test logs through the capturing writer; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn capabilities() -> ProviderCapabilities {
    ProviderCapabilities {
        supports_streaming: false,
        supports_tools: true,
        max_context_tokens: 32_000,
    }
}

pub fn answer(provider: &str, content: &str) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        tool_calls: vec![],
        finish_reason: FinishReason::Stop,
        usage: Usage::new(20, 10),
        model: "mock".into(),
        provider: provider.into(),
        latency: Duration::ZERO,
    }
}

pub fn tool_request(provider: &str, calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        finish_reason: FinishReason::ToolCalls,
        tool_calls: calls,
        ..answer(provider, "")
    }
}

/// Pops one scripted outcome per chat call; repeats the last answer when the
/// script runs dry.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<Vec<LlmResult<ChatResponse>>>,
    pub calls: AtomicUsize,
    caps: ProviderCapabilities,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<LlmResult<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            caps: capabilities(),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }
    fn models(&self) -> Vec<String> {
        vec![format!("{}-model", self.name)]
    }
    fn capabilities(&self) -> &ProviderCapabilities {
        &self.caps
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
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Ok(answer(&self.name, "script exhausted"))
        } else {
            script.remove(0)
        }
    }
    async fn chat_stream(
        &self,
        _ctx: &CancellationToken,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _opts: &ChatOptions,
    ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>> {
        Err(LlmError::ProviderDown {
            provider: self.name.clone(),
            message: "no streaming in scripted provider".into(),
        })
    }
}

/// Routes behavior off the system prompt, which is how one shared provider
/// can serve a whole agent fleet in tests. Analysts answer with trivial
/// content; the CIO and reporter get recognizable outputs; roles listed in
/// `fail_when_prompt_contains` fail with ProviderDown.
pub struct RoleProvider {
    pub fail_when_prompt_contains: Vec<String>,
    pub cio_prompts: Mutex<Vec<String>>,
    caps: ProviderCapabilities,
}

impl RoleProvider {
    pub fn new(fail_roles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_when_prompt_contains: fail_roles.iter().map(|s| s.to_string()).collect(),
            cio_prompts: Mutex::new(Vec::new()),
            caps: capabilities(),
        })
    }

    pub fn cio_calls(&self) -> Vec<String> {
        self.cio_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for RoleProvider {
    fn name(&self) -> &str {
        "role-mock"
    }
    fn models(&self) -> Vec<String> {
        vec!["role-mock-model".into()]
    }
    fn capabilities(&self) -> &ProviderCapabilities {
        &self.caps
    }
    async fn ping(&self, _ctx: &CancellationToken) -> LlmResult<()> {
        Ok(())
    }
    async fn chat(
        &self,
        _ctx: &CancellationToken,
        messages: &[Message],
        _tools: &[ToolSpec],
        _opts: &ChatOptions,
    ) -> LlmResult<ChatResponse> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        for marker in &self.fail_when_prompt_contains {
            if system.contains(marker.as_str()) {
                return Err(LlmError::ProviderDown {
                    provider: "role-mock".into(),
                    message: format!("scripted outage for '{marker}'"),
                });
            }
        }

        if system.contains("Chief Investment Officer") {
            let prompt = messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.cio_prompts.lock().unwrap().push(prompt);
            return Ok(answer("role-mock", "Verdict: BUY. Conviction: high."));
        }
        if system.contains("report writer") {
            return Ok(answer("role-mock", "# Final report\n\nVerdict: BUY."));
        }

        // Analysts: trivial role-stamped content.
        let stamp = if system.contains("fundamental") {
            "fundamental view: earnings solid"
        } else if system.contains("technical analyst") {
            "technical view: uptrend intact"
        } else if system.contains("sentiment") {
            "sentiment view: coverage positive"
        } else if system.contains("derivatives") {
            "derivatives view: PCR supportive"
        } else if system.contains("risk") {
            "risk view: volatility moderate"
        } else {
            "generalist view"
        };
        Ok(answer("role-mock", stamp))
    }
    async fn chat_stream(
        &self,
        _ctx: &CancellationToken,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _opts: &ChatOptions,
    ) -> LlmResult<mpsc::Receiver<LlmResult<StreamChunk>>> {
        Err(LlmError::ProviderDown {
            provider: "role-mock".into(),
            message: "no streaming".into(),
        })
    }
}

/// A data source seeded with enough RELIANCE/TCS fixtures to satisfy every
/// agent tool.
pub fn seeded_source() -> Arc<StaticDataSource> {
    let source = StaticDataSource::new();
    for (ticker, base_price) in [("RELIANCE", 2840.5), ("TCS", 3850.0)] {
        source.insert_quote(Quote {
            ticker: ticker.into(),
            price: base_price,
            change: 12.5,
            change_pct: 0.44,
            volume: 4_500_000,
            day_open: base_price * 0.995,
            day_high: base_price * 1.01,
            day_low: base_price * 0.99,
            prev_close: base_price - 12.5,
            timestamp: Utc::now(),
        });
        source.insert_financials(Financials {
            ticker: ticker.into(),
            pe_ratio: 24.5,
            pb_ratio: 3.1,
            roe: 14.2,
            roce: 16.8,
            debt_to_equity: 0.4,
            ..Default::default()
        });
        let bars: Vec<Bar> = (0..200)
            .map(|i| {
                let close = base_price * (0.8 + i as f64 * 0.001);
                Bar {
                    timestamp: Utc::now() - chrono::Duration::days(200 - i as i64),
                    open: close * 0.999,
                    high: close * 1.005,
                    low: close * 0.995,
                    close,
                    volume: 1_000_000,
                }
            })
            .collect();
        source.insert_history(ticker, bars);
        source.insert_option_chain(OptionChain {
            ticker: ticker.into(),
            expiry: (Utc::now() + chrono::Duration::days(20)).date_naive(),
            spot: base_price,
            strikes: vec![
                OptionStrike {
                    strike: (base_price * 0.95).round(),
                    call_oi: 1_200,
                    put_oi: 3_400,
                    ..Default::default()
                },
                OptionStrike {
                    strike: (base_price * 1.05).round(),
                    call_oi: 4_100,
                    put_oi: 900,
                    ..Default::default()
                },
            ],
        });
        source.insert_news(
            ticker,
            vec![NewsItem {
                title: format!("{ticker} beats estimates, profit surges"),
                summary: "Strong quarter".into(),
                source: "wire".into(),
                url: "https://example.com".into(),
                published_at: Utc::now(),
            }],
        );
    }
    source.insert_profile(niveshak::data::StockProfile {
        ticker: "TCS".into(),
        name: "Tata Consultancy Services".into(),
        sector: "Information Technology".into(),
        industry: "IT Services".into(),
        market_cap: 14_00_000.0,
        description: "IT services and consulting".into(),
    });
    Arc::new(source)
}
