//! Specialist agent constructors.
//!
//! Each factory binds the base agent to a role prompt, a fixed tool set over
//! the shared `DataSource`, and tuned memory/iteration caps. Agents are
//! built once at startup and reused for every task.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;

use super::base::{Agent, AgentConfig};
use super::AgentRole;
use crate::data::{Bar, DataSource, Timeframe};
use crate::llm::Provider;
use crate::tools::{self, Params, Tool, ToolRegistry};
use crate::{agents::analysis, ta};

// ============================================================================
// Argument helpers
// ============================================================================

fn parse_args(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

fn arg_str(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_uppercase)
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}

fn arg_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn arg_f64(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(default)
}

async fn fetch_bars(source: &dyn DataSource, ticker: &str, days: u64) -> anyhow::Result<Vec<Bar>> {
    let to = Utc::now().date_naive();
    // Calendar buffer so `days` trading sessions actually fit the window.
    let from = to - Duration::days((days * 2) as i64);
    let bars = source.get_historical(ticker, from, to, Timeframe::Day).await?;
    if bars.is_empty() {
        anyhow::bail!("no historical data for {ticker}");
    }
    Ok(bars)
}

fn ticker_param() -> Params {
    Params::new().required("ticker", tools::string("Stock symbol, e.g. RELIANCE"))
}

// ============================================================================
// Shared tools
// ============================================================================

fn quote_tool(source: Arc<dyn DataSource>) -> Tool {
    Tool::new(
        "get_quote",
        "Latest traded price, change and volume for a ticker",
        ticker_param().build(),
        move |_ctx, raw| {
            let source = source.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let quote = source.get_quote(&ticker).await?;
                Ok(serde_json::to_string(&quote)?)
            })
        },
    )
}

fn historical_tool(source: Arc<dyn DataSource>) -> Tool {
    Tool::new(
        "get_historical",
        "Daily OHLCV bars for a ticker over the last N days",
        ticker_param()
            .optional(
                "days",
                tools::with_default(tools::integer("Lookback in days"), serde_json::json!(90)),
            )
            .build(),
        move |_ctx, raw| {
            let source = source.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let days = arg_u64(&args, "days", 90);
                let bars = fetch_bars(source.as_ref(), &ticker, days).await?;
                let tail: Vec<&Bar> = bars.iter().rev().take(days as usize).rev().collect();
                Ok(serde_json::to_string(&tail)?)
            })
        },
    )
}

// ============================================================================
// Fundamental analyst
// ============================================================================

const FUNDAMENTAL_PROMPT: &str = "\
You are a fundamental equity analyst covering Indian markets. Judge business \
quality and valuation: earnings, margins, return ratios, leverage, growth and \
promoter holding. Use your tools for data; never invent figures. Finish with \
a JSON object: {\"ticker\", \"verdict\" (STRONG BUY/BUY/HOLD/SELL/STRONG \
SELL), \"confidence\" (0-100), \"target_price\", \"summary\", \"key_points\", \
\"risks\"}.";

pub fn fundamental_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();
    registry.register(quote_tool(source.clone()));

    let src = source.clone();
    registry.register(Tool::new(
        "get_financials",
        "Fundamental snapshot: earnings, ratios, growth, holdings",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let financials = src.get_financials(&ticker).await?;
                Ok(serde_json::to_string(&financials)?)
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_ratio_analysis",
        "Valuation and quality ratios, pre-computed and labelled",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let financials = src.get_financials(&ticker).await?;
                Ok(analysis::ratio_summary(&financials))
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_stock_profile",
        "Company name, sector, industry and market cap",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let profile = src.get_stock_profile(&ticker).await?;
                Ok(serde_json::to_string(&profile)?)
            })
        },
    ));

    Agent::new(
        "fundamental-analyst",
        AgentRole::Fundamental,
        FUNDAMENTAL_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig { max_tool_iterations: 8, extract_analysis: true, ..Default::default() },
    )
}

// ============================================================================
// Technical analyst
// ============================================================================

const TECHNICAL_PROMPT: &str = "\
You are a technical analyst for Indian equities. Read price action: trend, \
momentum, volatility and key levels. Lean on RSI, moving averages, MACD and \
ATR from your tools; cite the numbers you use. Finish with a JSON object: \
{\"ticker\", \"verdict\", \"confidence\" (0-100), \"target_price\", \
\"stop_loss\", \"summary\", \"key_points\", \"risks\"}.";

pub fn technical_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();
    registry.register(quote_tool(source.clone()));
    registry.register(historical_tool(source.clone()));

    let src = source.clone();
    registry.register(Tool::new(
        "get_rsi",
        "Relative strength index for a ticker",
        ticker_param()
            .optional(
                "period",
                tools::with_default(tools::integer("RSI period"), serde_json::json!(14)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let period = arg_u64(&args, "period", 14) as usize;
                let bars = fetch_bars(src.as_ref(), &ticker, (period * 4) as u64).await?;
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                let series = ta::rsi(&closes, period);
                match series.last() {
                    Some(value) => Ok(format!("{value:.2}")),
                    None => Ok(format!("insufficient history for RSI({period})")),
                }
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_sma",
        "Simple moving average of closing prices",
        ticker_param()
            .optional(
                "period",
                tools::with_default(tools::integer("SMA period"), serde_json::json!(50)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let period = arg_u64(&args, "period", 50) as usize;
                let bars = fetch_bars(src.as_ref(), &ticker, (period * 2) as u64).await?;
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                match ta::sma(&closes, period).last() {
                    Some(value) => Ok(format!("{value:.2}")),
                    None => Ok(format!("insufficient history for SMA({period})")),
                }
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_macd",
        "MACD line, signal and histogram (12/26/9)",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let bars = fetch_bars(src.as_ref(), &ticker, 150).await?;
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                let (line, signal, histogram) = ta::macd(&closes, 12, 26, 9);
                match (line.last(), signal.last(), histogram.last()) {
                    (Some(l), Some(s), Some(h)) => Ok(format!(
                        "{{\"macd\": {l:.3}, \"signal\": {s:.3}, \"histogram\": {h:.3}}}"
                    )),
                    _ => Ok("insufficient history for MACD".to_string()),
                }
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_atr",
        "Average true range: recent volatility in price units",
        ticker_param()
            .optional(
                "period",
                tools::with_default(tools::integer("ATR period"), serde_json::json!(14)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let period = arg_u64(&args, "period", 14) as usize;
                let bars = fetch_bars(src.as_ref(), &ticker, (period * 4) as u64).await?;
                match ta::atr(&bars, period).last() {
                    Some(value) => Ok(format!("{value:.2}")),
                    None => Ok(format!("insufficient history for ATR({period})")),
                }
            })
        },
    ));

    Agent::new(
        "technical-analyst",
        AgentRole::Technical,
        TECHNICAL_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig { max_tool_iterations: 8, extract_analysis: true, ..Default::default() },
    )
}

// ============================================================================
// Sentiment analyst
// ============================================================================

const SENTIMENT_PROMPT: &str = "\
You are a market sentiment analyst. Weigh news flow, announcements and \
headline tone for the ticker. Distinguish noise from material developments. \
Finish with a JSON object: {\"ticker\", \"verdict\", \"confidence\" (0-100), \
\"summary\", \"key_points\", \"risks\"}.";

pub fn sentiment_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();

    let src = source.clone();
    registry.register(Tool::new(
        "get_news",
        "Recent headlines for a ticker",
        ticker_param()
            .optional(
                "limit",
                tools::with_default(tools::integer("Max headlines"), serde_json::json!(10)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let limit = arg_u64(&args, "limit", 10) as usize;
                let news = src.get_news(&ticker, limit).await?;
                if news.is_empty() {
                    return Ok(format!("no recent news for {ticker}"));
                }
                Ok(serde_json::to_string(&news)?)
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "score_sentiment",
        "Lexicon sentiment score over recent headlines, -1 to +1",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let news = src.get_news(&ticker, 20).await?;
                let titles: Vec<String> = news.iter().map(|n| n.title.clone()).collect();
                let score = analysis::sentiment_score(&titles);
                Ok(format!(
                    "{{\"score\": {score:.2}, \"label\": \"{}\", \"headlines\": {}}}",
                    analysis::sentiment_label(score),
                    titles.len()
                ))
            })
        },
    ));

    Agent::new(
        "sentiment-analyst",
        AgentRole::Sentiment,
        SENTIMENT_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig { max_tool_iterations: 6, extract_analysis: true, ..Default::default() },
    )
}

// ============================================================================
// Derivatives analyst
// ============================================================================

const DERIVATIVES_PROMPT: &str = "\
You are a derivatives analyst. Read positioning from the option chain: \
put/call ratio, open interest concentration, max pain versus spot. Finish \
with a JSON object: {\"ticker\", \"verdict\", \"confidence\" (0-100), \
\"summary\", \"key_points\", \"risks\"}.";

pub fn derivatives_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();

    let src = source.clone();
    registry.register(Tool::new(
        "get_option_chain",
        "Option chain with per-strike OI, premiums and IV",
        ticker_param()
            .optional("expiry", tools::string("Expiry date YYYY-MM-DD; nearest if omitted"))
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let expiry = args
                    .get("expiry")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok());
                let chain = src.get_option_chain(&ticker, expiry).await?;
                Ok(serde_json::to_string(&chain)?)
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_positioning",
        "Derived positioning: PCR, max pain, distance from spot",
        ticker_param().build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let chain = src.get_option_chain(&ticker, None).await?;
                let pcr = chain.put_call_ratio();
                let max_pain = chain.max_pain();
                let distance_pct = if chain.spot > 0.0 {
                    (max_pain - chain.spot) / chain.spot * 100.0
                } else {
                    0.0
                };
                Ok(format!(
                    "{{\"pcr\": {pcr:.2}, \"max_pain\": {max_pain}, \
                     \"spot\": {}, \"max_pain_distance_pct\": {distance_pct:.2}}}",
                    chain.spot
                ))
            })
        },
    ));

    Agent::new(
        "derivatives-analyst",
        AgentRole::Derivatives,
        DERIVATIVES_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig { max_tool_iterations: 6, extract_analysis: true, ..Default::default() },
    )
}

// ============================================================================
// Risk analyst
// ============================================================================

const RISK_PROMPT: &str = "\
You are a risk analyst. Quantify downside: volatility, drawdown potential, \
liquidity and position sizing. Recommend a stop and a maximum position. \
Finish with a JSON object: {\"ticker\", \"verdict\", \"confidence\" (0-100), \
\"stop_loss\", \"summary\", \"key_points\", \"risks\"}.";

pub fn risk_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();
    registry.register(quote_tool(source.clone()));

    let src = source.clone();
    registry.register(Tool::new(
        "get_volatility",
        "Annualized volatility (%) from daily closes",
        ticker_param()
            .optional(
                "days",
                tools::with_default(tools::integer("Lookback days"), serde_json::json!(90)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let days = arg_u64(&args, "days", 90);
                let bars = fetch_bars(src.as_ref(), &ticker, days).await?;
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                Ok(format!("{:.2}", analysis::annualized_volatility(&closes)))
            })
        },
    ));

    let src = source.clone();
    registry.register(Tool::new(
        "get_atr_stop",
        "ATR-multiple stop level for a long entry at the current price",
        ticker_param()
            .optional(
                "multiplier",
                tools::with_default(tools::number("ATR multiplier"), serde_json::json!(2.0)),
            )
            .build(),
        move |_ctx, raw| {
            let src = src.clone();
            Box::pin(async move {
                let args = parse_args(&raw);
                let ticker = arg_str(&args, "ticker")?;
                let multiplier = arg_f64(&args, "multiplier", 2.0);
                let quote = src.get_quote(&ticker).await?;
                let bars = fetch_bars(src.as_ref(), &ticker, 60).await?;
                let Some(atr) = ta::atr(&bars, 14).last().copied() else {
                    return Ok("insufficient history for ATR stop".to_string());
                };
                let stop = analysis::atr_stop(quote.price, atr, multiplier);
                Ok(format!(
                    "{{\"entry\": {}, \"atr\": {atr:.2}, \"stop\": {stop:.2}}}",
                    quote.price
                ))
            })
        },
    ));

    registry.register(position_size_tool());

    Agent::new(
        "risk-analyst",
        AgentRole::Risk,
        RISK_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig { max_tool_iterations: 6, extract_analysis: true, ..Default::default() },
    )
}

fn position_size_tool() -> Tool {
    Tool::new(
        "position_size",
        "Fixed-fractional position size from capital, risk % and stop",
        Params::new()
            .required("capital", tools::number("Available capital"))
            .required("entry", tools::number("Entry price"))
            .required("stop", tools::number("Stop-loss price"))
            .optional(
                "risk_pct",
                tools::with_default(tools::number("Risk per trade, %"), serde_json::json!(1.0)),
            )
            .build(),
        |_ctx, raw| {
            Box::pin(async move {
                let args = parse_args(&raw);
                let capital = arg_f64(&args, "capital", 0.0);
                let entry = arg_f64(&args, "entry", 0.0);
                let stop = arg_f64(&args, "stop", 0.0);
                let risk_pct = arg_f64(&args, "risk_pct", 1.0);
                let qty = analysis::position_size(capital, risk_pct, entry, stop);
                Ok(format!(
                    "{{\"quantity\": {qty}, \"exposure\": {:.2}}}",
                    qty as f64 * entry
                ))
            })
        },
    )
}

// ============================================================================
// Execution planner
// ============================================================================

const EXECUTOR_PROMPT: &str = "\
You are an execution planner. Given a verdict and levels, produce a concrete \
order plan: side, quantity, entry style (market or limit with a level), stop \
and target. Size positions with your tools; be explicit about assumptions.";

pub fn executor_agent(provider: Arc<dyn Provider>, source: Arc<dyn DataSource>) -> Agent {
    let registry = ToolRegistry::new();
    registry.register(quote_tool(source));
    registry.register(position_size_tool());

    Agent::new(
        "execution-planner",
        AgentRole::Executor,
        EXECUTOR_PROMPT,
        provider,
        Arc::new(registry),
        AgentConfig {
            max_tool_iterations: 4,
            memory_size: 10,
            keep_recent: 4,
            ..Default::default()
        },
    )
}

// ============================================================================
// Reporter
// ============================================================================

const REPORTER_PROMPT: &str = "\
You are a financial report writer. Turn the supplied analyses into a clean \
markdown report: a headline verdict, a short thesis, sections per analysis \
dimension, and a risk box. Keep every figure exactly as given; do not invent \
data or hedge the verdict.";

pub fn reporter_agent(provider: Arc<dyn Provider>) -> Agent {
    Agent::new(
        "reporter",
        AgentRole::Reporter,
        REPORTER_PROMPT,
        provider,
        Arc::new(ToolRegistry::new()),
        AgentConfig {
            max_tool_iterations: 4,
            memory_size: 10,
            keep_recent: 4,
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticDataSource;
    use crate::error::LlmResult;
    use crate::llm::{
        ChatOptions, ChatResponse, FinishReason, Message, ProviderCapabilities, StreamChunk,
        ToolSpec, Usage,
    };
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct EchoProvider {
        capabilities: ProviderCapabilities,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
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
            Ok(ChatResponse {
                content: "ok".into(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
                model: "echo".into(),
                provider: "echo".into(),
                latency: std::time::Duration::ZERO,
            })
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

    fn provider() -> Arc<dyn Provider> {
        Arc::new(EchoProvider {
            capabilities: ProviderCapabilities {
                supports_streaming: false,
                supports_tools: true,
                max_context_tokens: 8192,
            },
        })
    }

    fn seeded_source() -> Arc<StaticDataSource> {
        let source = StaticDataSource::new();
        let now = Utc::now();
        source.insert_quote(crate::data::Quote {
            ticker: "TCS".into(),
            price: 3850.0,
            change: 25.0,
            change_pct: 0.65,
            volume: 1_200_000,
            day_open: 3830.0,
            day_high: 3880.0,
            day_low: 3810.0,
            prev_close: 3825.0,
            timestamp: now,
        });
        let bars: Vec<Bar> = (0..120)
            .map(|i| {
                let close = 3500.0 + i as f64 * 3.0;
                Bar {
                    timestamp: Utc::now() - chrono::Duration::days(120 - i as i64),
                    open: close - 5.0,
                    high: close + 10.0,
                    low: close - 10.0,
                    close,
                    volume: 1_000_000,
                }
            })
            .collect();
        source.insert_history("TCS", bars);
        Arc::new(source)
    }

    #[test]
    fn test_tool_sets_per_role() {
        let source = seeded_source();
        let fundamental = fundamental_agent(provider(), source.clone());
        let names: Vec<String> =
            fundamental.registry().list().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"get_financials".to_string()));
        assert!(names.contains(&"get_ratio_analysis".to_string()));

        let technical = technical_agent(provider(), source.clone());
        assert!(technical.registry().contains("get_rsi"));
        assert!(technical.registry().contains("get_macd"));

        let reporter = reporter_agent(provider());
        assert!(reporter.registry().is_empty());
    }

    #[test]
    fn test_iteration_caps() {
        let source = seeded_source();
        assert_eq!(fundamental_agent(provider(), source.clone()).config().max_tool_iterations, 8);
        assert_eq!(sentiment_agent(provider(), source.clone()).config().max_tool_iterations, 6);
        assert_eq!(executor_agent(provider(), source).config().max_tool_iterations, 4);
    }

    #[tokio::test]
    async fn test_rsi_tool_handler() {
        let source = seeded_source();
        let technical = technical_agent(provider(), source);
        let tool = technical.registry().get("get_rsi").unwrap();
        let ctx = CancellationToken::new();
        let output = (tool.handler)(ctx, r#"{"ticker": "tcs"}"#.into()).await.unwrap();
        // Steady uptrend: RSI pinned at 100.
        let value: f64 = output.parse().unwrap();
        assert!(value > 95.0);
    }

    #[tokio::test]
    async fn test_missing_ticker_argument_errors() {
        let source = seeded_source();
        let technical = technical_agent(provider(), source);
        let tool = technical.registry().get("get_rsi").unwrap();
        let ctx = CancellationToken::new();
        let err = (tool.handler)(ctx, "{}".into()).await.unwrap_err();
        assert!(err.to_string().contains("ticker"));
    }

    #[tokio::test]
    async fn test_position_size_tool() {
        let tool = position_size_tool();
        let ctx = CancellationToken::new();
        let output = (tool.handler)(
            ctx,
            r#"{"capital": 100000, "entry": 500, "stop": 480, "risk_pct": 1.0}"#.into(),
        )
        .await
        .unwrap();
        assert!(output.contains("\"quantity\": 50"));
    }
}
