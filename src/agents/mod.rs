//! Agent runtime.
//!
//! Every specialist shares one lifecycle: system prompt + memory + tool
//! registry + bounded tool loop, with optional structured-result extraction
//! from the final answer. The orchestrator composes the specialists into
//! single- or multi-agent workflows.

pub mod analysis;
mod base;
pub mod memory;
mod orchestrator;
mod specialists;

pub use base::{Agent, AgentConfig};
pub use memory::ConversationMemory;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorMode};
pub use specialists::{
    derivatives_agent, executor_agent, fundamental_agent, reporter_agent, risk_agent,
    sentiment_agent, technical_agent,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Usage};

/// Analyst roles. `as_str` values appear in results and synthesis prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Fundamental,
    Technical,
    Sentiment,
    Derivatives,
    Risk,
    Executor,
    Reporter,
    Cio,
    Orchestrator,
    Generalist,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Fundamental => "fundamental",
            AgentRole::Technical => "technical",
            AgentRole::Sentiment => "sentiment",
            AgentRole::Derivatives => "derivatives",
            AgentRole::Risk => "risk",
            AgentRole::Executor => "executor",
            AgentRole::Reporter => "reporter",
            AgentRole::Cio => "cio",
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Generalist => "generalist",
        }
    }
}

/// Outcome of one agent task.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_name: String,
    pub role: AgentRole,
    pub content: String,
    /// Parsed structured analysis, when the agent produced one.
    pub analysis: Option<AnalysisResult>,
    pub tool_call_count: usize,
    pub tokens: Usage,
    pub duration: Duration,
    /// Complete final transcript (system prompt excluded): the task, every
    /// tool call and result, and the final answer. Lets callers audit or
    /// replay the run.
    pub messages: Vec<Message>,
    pub error: Option<String>,
}

/// Structured analyst verdict extracted from a model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub ticker: String,
    /// STRONG BUY / BUY / HOLD / SELL / STRONG SELL.
    #[serde(default)]
    pub verdict: String,
    /// Conviction, 0-100.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub target_price: f64,
    #[serde(default)]
    pub stop_loss: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl AnalysisResult {
    /// Locate the first JSON object in `content`, parse it, and merge its
    /// non-empty fields over `default`. Parse failure is non-fatal: the
    /// default comes back with the raw content as its summary.
    pub fn extract(content: &str, default: AnalysisResult) -> AnalysisResult {
        let candidate = extract_json_block(content);
        let Ok(parsed) = serde_json::from_str::<AnalysisResult>(&candidate) else {
            return AnalysisResult { summary: content.to_string(), ..default };
        };
        AnalysisResult {
            ticker: non_empty(parsed.ticker, default.ticker),
            verdict: non_empty(parsed.verdict, default.verdict),
            confidence: if parsed.confidence != 0.0 { parsed.confidence } else { default.confidence },
            target_price: if parsed.target_price != 0.0 {
                parsed.target_price
            } else {
                default.target_price
            },
            stop_loss: if parsed.stop_loss != 0.0 { parsed.stop_loss } else { default.stop_loss },
            summary: non_empty(parsed.summary, default.summary),
            key_points: if parsed.key_points.is_empty() {
                default.key_points
            } else {
                parsed.key_points
            },
            risks: if parsed.risks.is_empty() { default.risks } else { parsed.risks },
        }
    }
}

fn non_empty(candidate: String, fallback: String) -> String {
    if candidate.trim().is_empty() {
        fallback
    } else {
        candidate
    }
}

/// Extract JSON from markdown code fences, or the outermost `{...}` span.
pub(crate) fn extract_json_block(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('{') || content.starts_with('[') {
                return content.to_string();
            }
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
