//! Orchestrator: single-agent quick path or five-analyst fan-out with CIO
//! synthesis and a reporter formatting pass.
//!
//! The fan-out tolerates partial failure: analyst errors are recorded and
//! fed to the CIO as context, never aborting the run. Only a synthesis
//! failure degrades further, to a deterministic compile of raw outputs, so
//! the caller always receives a non-empty result.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::base::Agent;
use super::specialists::{
    derivatives_agent, fundamental_agent, reporter_agent, risk_agent, sentiment_agent,
    technical_agent,
};
use super::{AgentConfig, AgentResult, AgentRole, AnalysisResult};
use crate::data::DataSource;
use crate::error::LlmResult;
use crate::llm::{Message, Provider, Usage};
use crate::tools::ToolRegistry;

/// (role name, synthesis weight %) for the CIO prompt.
const ANALYST_WEIGHTS: &[(&str, u32)] = &[
    ("fundamental", 30),
    ("technical", 25),
    ("sentiment", 15),
    ("derivatives", 15),
    ("risk", 15),
];

const VERDICTS: &[&str] = &["STRONG BUY", "BUY", "HOLD", "SELL", "STRONG SELL"];

/// NSE large caps recognized without uppercase spelling.
static KNOWN_TICKERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "RELIANCE", "TCS", "INFY", "HDFCBANK", "ICICIBANK", "SBIN", "WIPRO", "HCLTECH",
        "ITC", "LT", "BHARTIARTL", "KOTAKBANK", "AXISBANK", "BAJFINANCE", "MARUTI",
        "ASIANPAINT", "TITAN", "SUNPHARMA", "TATAMOTORS", "TATASTEEL", "NTPC", "POWERGRID",
        "ULTRACEMCO", "NESTLEIND", "ONGC", "ADANIENT", "ADANIPORTS", "COALINDIA", "HINDALCO",
        "JSWSTEEL", "TECHM", "DRREDDY", "CIPLA", "DIVISLAB", "EICHERMOT", "GRASIM",
        "HEROMOTOCO", "BRITANNIA", "APOLLOHOSP", "BAJAJFINSV", "INDUSINDBK", "TATACONSUM",
        "SBILIFE", "HDFCLIFE", "BPCL", "UPL", "NIFTY", "BANKNIFTY", "HINDUNILVR", "M&M",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorMode {
    Single,
    Multi,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_mode: OrchestratorMode,
    /// Capital assumption handed to execution-oriented prompts.
    pub default_capital: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { default_mode: OrchestratorMode::Multi, default_capital: 1_000_000.0 }
    }
}

pub struct Orchestrator {
    analysts: Vec<Arc<Agent>>,
    reporter: Arc<Agent>,
    generalist: Arc<Agent>,
    provider: Arc<dyn Provider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Build the full agent fleet over one provider handle (typically the
    /// router) and one data source.
    pub fn new(
        provider: Arc<dyn Provider>,
        source: Arc<dyn DataSource>,
        config: OrchestratorConfig,
    ) -> Self {
        let analysts: Vec<Arc<Agent>> = vec![
            Arc::new(fundamental_agent(provider.clone(), source.clone())),
            Arc::new(technical_agent(provider.clone(), source.clone())),
            Arc::new(sentiment_agent(provider.clone(), source.clone())),
            Arc::new(derivatives_agent(provider.clone(), source.clone())),
            Arc::new(risk_agent(provider.clone(), source.clone())),
        ];

        // Single mode runs one generalist carrying every analyst tool,
        // deduplicated by name.
        let merged = ToolRegistry::new();
        for analyst in &analysts {
            merged.merge_from(analyst.registry());
        }
        let generalist = Arc::new(Agent::new(
            "generalist-analyst",
            AgentRole::Generalist,
            "You are an equity analyst for Indian markets with access to \
             fundamental, technical, sentiment, derivatives and risk tools. \
             Answer the user's question directly, fetching only the data you \
             need.",
            provider.clone(),
            Arc::new(merged),
            AgentConfig { max_tool_iterations: 12, ..Default::default() },
        ));

        let reporter = Arc::new(reporter_agent(provider.clone()));

        Self { analysts, reporter, generalist, provider, config }
    }

    pub fn analysts(&self) -> &[Arc<Agent>] {
        &self.analysts
    }

    /// Entry point. `mode` overrides the configured default.
    pub async fn process(
        &self,
        ctx: &CancellationToken,
        query: &str,
        mode: Option<OrchestratorMode>,
    ) -> LlmResult<AgentResult> {
        match mode.unwrap_or(self.config.default_mode) {
            OrchestratorMode::Single => self.generalist.process(ctx, query).await,
            OrchestratorMode::Multi => match extract_ticker(query) {
                Some(ticker) => self.run_multi(ctx, query, &ticker).await,
                // No ticker to fan out on: degrade to the quick path.
                None => self.generalist.process(ctx, query).await,
            },
        }
    }

    async fn run_multi(
        &self,
        ctx: &CancellationToken,
        query: &str,
        ticker: &str,
    ) -> LlmResult<AgentResult> {
        let started = Instant::now();
        tracing::info!(ticker, "multi-agent analysis starting");

        // Fan out all five analysts; the shared token cancels every
        // outstanding one if the caller gives up.
        let task = format!(
            "Analyze {ticker}. Original request: {query}\nWorking capital assumption: INR {:.0}",
            self.config.default_capital
        );
        let futures: Vec<_> = self
            .analysts
            .iter()
            .map(|analyst| {
                let analyst = analyst.clone();
                let task = task.clone();
                let ctx = ctx.clone();
                async move {
                    let outcome = analyst.process(&ctx, &task).await;
                    (analyst.role().as_str(), outcome)
                }
            })
            .collect();
        let outcomes = futures::future::join_all(futures).await;

        let mut successes: Vec<AgentResult> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => successes.push(result),
                Err(e) => {
                    tracing::warn!(analyst = name, error = %e, "analyst failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        let mut tool_call_count: usize = successes.iter().map(|r| r.tool_call_count).sum();
        let mut tokens = Usage::default();
        for result in &successes {
            tokens.add(result.tokens);
        }

        // CIO synthesis over whatever survived.
        let cio_prompt = build_cio_prompt(query, ticker, &successes, &failures);
        let cio_content = match self
            .provider
            .chat(
                ctx,
                &[Message::system(CIO_SYSTEM_PROMPT), Message::user(cio_prompt)],
                &[],
                &Default::default(),
            )
            .await
        {
            Ok(response) => {
                tokens.add(response.usage);
                response.content
            }
            Err(e) => {
                tracing::warn!(error = %e, "CIO synthesis failed, using deterministic compile");
                failures.push(format!("cio: {e}"));
                fallback_compile(ticker, &successes, &failures)
            }
        };

        // Reporter formatting; its failure falls back to the CIO text.
        let report_task = build_report_task(ticker, &cio_content, &successes);
        let content = match self.reporter.process_with_history(ctx, &report_task, &[]).await {
            Ok(result) => {
                tool_call_count += result.tool_call_count;
                tokens.add(result.tokens);
                result.content
            }
            Err(e) => {
                tracing::warn!(error = %e, "reporter failed, returning synthesis directly");
                failures.push(format!("reporter: {e}"));
                cio_content.clone()
            }
        };

        let analysis = AnalysisResult {
            ticker: ticker.to_string(),
            verdict: detect_verdict(&cio_content).unwrap_or_default(),
            summary: cio_content,
            ..Default::default()
        };

        Ok(AgentResult {
            agent_name: "orchestrator".to_string(),
            role: AgentRole::Orchestrator,
            content: content.clone(),
            analysis: Some(analysis),
            tool_call_count,
            tokens,
            duration: started.elapsed(),
            messages: vec![Message::user(query), Message::assistant(content)],
            error: if failures.is_empty() { None } else { Some(failures.join("; ")) },
        })
    }
}

// ============================================================================
// Ticker extraction
// ============================================================================

/// First query token that is either a known ticker or an all-uppercase
/// alphabetic word of length >= 2.
///
/// Kept faithful to its long-standing quirk: "RSI of RELIANCE" extracts
/// "RSI", since the scan is strictly first-token-wins.
pub fn extract_ticker(query: &str) -> Option<String> {
    for raw in query.split_whitespace() {
        let token: String = raw
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '&')
            .to_string();
        if token.len() < 2 {
            continue;
        }
        let upper = token.to_uppercase();
        if KNOWN_TICKERS.contains(upper.as_str()) {
            return Some(upper);
        }
        if token.chars().all(|c| c.is_ascii_uppercase()) {
            return Some(token);
        }
    }
    None
}

// ============================================================================
// Prompt building
// ============================================================================

const CIO_SYSTEM_PROMPT: &str = "\
You are the Chief Investment Officer. Weigh your analysts' work into a single \
recommendation. Resolve conflicts explicitly: say whose view you discounted \
and why. Output a verdict, a conviction level (low/medium/high), the core \
thesis in three sentences, and the key risk.";

fn build_cio_prompt(
    query: &str,
    ticker: &str,
    successes: &[AgentResult],
    failures: &[String],
) -> String {
    let mut prompt = format!("## Request\n{query}\n\n## Ticker\n{ticker}\n\n## Analyst inputs\n");
    for result in successes {
        prompt.push_str(&format!("\n### {} analyst\n{}\n", result.role.as_str(), result.content));
    }
    if !failures.is_empty() {
        prompt.push_str("\n## Unavailable analysts\n");
        for failure in failures {
            prompt.push_str(&format!("- {failure}\n"));
        }
    }
    prompt.push_str("\n## Weighting policy\n");
    for (name, weight) in ANALYST_WEIGHTS {
        prompt.push_str(&format!("- {name}: {weight}%\n"));
    }
    prompt.push_str(&format!(
        "\nProduce a final verdict from {{{}}} with a conviction level.\n",
        VERDICTS.join(", ")
    ));
    prompt
}

fn build_report_task(ticker: &str, cio_content: &str, successes: &[AgentResult]) -> String {
    let mut task = format!(
        "Write the final markdown report for {ticker}.\n\n## CIO synthesis\n{cio_content}\n"
    );
    for result in successes {
        task.push_str(&format!(
            "\n## {} analyst\n{}\n",
            result.role.as_str(),
            result.content
        ));
    }
    task
}

/// Deterministic report assembled from raw analyst output when the CIO call
/// fails. No model involved, so it cannot fail.
fn fallback_compile(ticker: &str, successes: &[AgentResult], failures: &[String]) -> String {
    let mut out = format!("# {ticker}: compiled analyst views\n");
    for result in successes {
        out.push_str(&format!("\n## {}\n{}\n", result.role.as_str(), result.content));
    }
    if !failures.is_empty() {
        out.push_str("\n## Unavailable\n");
        for failure in failures {
            out.push_str(&format!("- {failure}\n"));
        }
    }
    if successes.is_empty() {
        out.push_str("\nNo analyst completed; please retry.\n");
    }
    out
}

/// First verdict string found in the synthesis, longest forms first so
/// STRONG BUY is not read as BUY.
fn detect_verdict(content: &str) -> Option<String> {
    let upper = content.to_uppercase();
    for verdict in ["STRONG BUY", "STRONG SELL", "BUY", "SELL", "HOLD"] {
        if upper.contains(verdict) {
            return Some(verdict.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_known_ticker_lowercase() {
        assert_eq!(extract_ticker("analyze reliance for me"), Some("RELIANCE".into()));
        assert_eq!(extract_ticker("what about Infy?"), Some("INFY".into()));
    }

    #[test]
    fn test_extract_uppercase_token() {
        assert_eq!(extract_ticker("thoughts on ZOMATO today"), Some("ZOMATO".into()));
        assert_eq!(extract_ticker("no symbol here"), None);
    }

    #[test]
    fn test_extract_first_token_wins_quirk() {
        // Long-standing behavior: RSI is uppercase and comes first.
        assert_eq!(extract_ticker("RSI of RELIANCE"), Some("RSI".into()));
        assert_eq!(extract_ticker("rsi of RELIANCE"), Some("RELIANCE".into()));
    }

    #[test]
    fn test_extract_skips_short_tokens() {
        assert_eq!(extract_ticker("is IT a buy?"), Some("IT".into()));
        assert_eq!(extract_ticker("is I a buy"), None);
    }

    #[test]
    fn test_cio_prompt_contains_weights_and_failures() {
        let successes = vec![AgentResult {
            agent_name: "fundamental-analyst".into(),
            role: AgentRole::Fundamental,
            content: "solid earnings".into(),
            analysis: None,
            tool_call_count: 2,
            tokens: Usage::default(),
            duration: std::time::Duration::ZERO,
            messages: vec![],
            error: None,
        }];
        let failures = vec!["risk: provider anthropic unavailable: 503".to_string()];
        let prompt = build_cio_prompt("Analyze TCS", "TCS", &successes, &failures);

        assert!(prompt.contains("solid earnings"));
        assert!(prompt.contains("fundamental: 30%"));
        assert!(prompt.contains("risk: provider anthropic unavailable"));
        assert!(prompt.contains("STRONG BUY, BUY, HOLD, SELL, STRONG SELL"));
    }

    #[test]
    fn test_fallback_compile_never_empty() {
        let out = fallback_compile("TCS", &[], &["cio: down".into()]);
        assert!(out.contains("TCS"));
        assert!(out.contains("please retry"));
    }

    #[test]
    fn test_detect_verdict_longest_first() {
        assert_eq!(detect_verdict("Final call: STRONG BUY with high conviction"),
            Some("STRONG BUY".into()));
        assert_eq!(detect_verdict("we would buy the dip"), Some("BUY".into()));
        assert_eq!(detect_verdict("nothing actionable"), None);
    }
}
