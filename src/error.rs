//! Error taxonomies shared across the platform.
//!
//! `LlmError` is the stable classification every provider maps transport and
//! HTTP faults into; the router consults it to decide retryability. FinanceQL
//! and the backtest engine carry their own, much smaller, taxonomies.

use thiserror::Error;

/// Result alias for the LLM / agent layers.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Classified provider/agent errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Missing or rejected credential. Never retried.
    #[error("no API key configured for {provider}")]
    NoApiKey { provider: String },

    /// Unknown model name. Never retried.
    #[error("invalid model '{model}' for {provider}")]
    InvalidModel { provider: String, model: String },

    /// Input exceeded the model context window. Never retried.
    #[error("context length exceeded: {0}")]
    ContextLength(String),

    /// Provider throttled the request. Retried by the router.
    #[error("rate limited by {provider}: {message}")]
    RateLimit { provider: String, message: String },

    /// Transport failure or 5xx. Retried by the router.
    #[error("provider {provider} unavailable: {message}")]
    ProviderDown { provider: String, message: String },

    /// Any other vendor-reported failure, kept with its HTTP status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The model requested a tool that is not registered. Recoverable: the
    /// tool loop injects the failure into the transcript instead of aborting.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The tool loop hit its iteration cap without a final answer.
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded { max_iterations: usize },

    /// Every provider in the router chain failed.
    #[error("all providers failed, last error: {last}")]
    AllProvidersFailed { last: Box<LlmError> },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Malformed wire payload from a provider.
    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Raw transport error that escaped classification.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether the router should retry this error on the same provider
    /// before moving down the fallback chain.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::NoApiKey { .. }
            | LlmError::InvalidModel { .. }
            | LlmError::ContextLength(_)
            | LlmError::Cancelled
            | LlmError::ToolLoopExceeded { .. } => false,
            LlmError::RateLimit { .. }
            | LlmError::ProviderDown { .. }
            | LlmError::Transport(_) => true,
            // Vendor 4xx other than the classified kinds are not worth
            // retrying; everything 5xx arrives as ProviderDown already.
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::ToolNotFound(_) => true,
            LlmError::AllProvidersFailed { .. } | LlmError::Decode(_) => false,
        }
    }

    /// Classify an HTTP status + body into the taxonomy.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let lower = body.to_ascii_lowercase();
        match status {
            401 | 403 => LlmError::NoApiKey {
                provider: provider.to_string(),
            },
            404 if lower.contains("model") => LlmError::InvalidModel {
                provider: provider.to_string(),
                model: extract_model_name(body).unwrap_or_else(|| "<unknown>".into()),
            },
            413 => LlmError::ContextLength(body.to_string()),
            400 if lower.contains("context length") || lower.contains("maximum context") => {
                LlmError::ContextLength(body.to_string())
            }
            400 if lower.contains("model") && lower.contains("not found") => {
                LlmError::InvalidModel {
                    provider: provider.to_string(),
                    model: extract_model_name(body).unwrap_or_else(|| "<unknown>".into()),
                }
            }
            429 => LlmError::RateLimit {
                provider: provider.to_string(),
                message: body.to_string(),
            },
            s if s >= 500 => LlmError::ProviderDown {
                provider: provider.to_string(),
                message: format!("{}: {}", s, body),
            },
            s => LlmError::Api {
                status: s,
                message: body.to_string(),
            },
        }
    }
}

/// Best-effort pull of a quoted model name out of a vendor error body.
fn extract_model_name(body: &str) -> Option<String> {
    let start = body.find('`').or_else(|| body.find('\''))?;
    let quote = body.as_bytes()[start] as char;
    let rest = &body[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// FinanceQL errors: parse errors carry position info, eval errors do not.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QlError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        /// Byte offset into the source.
        pos: usize,
        line: usize,
        column: usize,
        message: String,
        hint: Option<String>,
    },

    #[error("evaluation error: {0}")]
    Eval(String),
}

impl QlError {
    pub fn eval(msg: impl Into<String>) -> Self {
        QlError::Eval(msg.into())
    }
}

/// Backtest engine errors. Simulated order failures are recorded on the
/// result as skipped orders and never surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BacktestError {
    #[error("insufficient data: need at least 2 bars, got {0}")]
    InsufficientData(usize),
}
