//! niveshak: AI analyst platform for Indian equities.
//!
//! Four cores compose into the user-visible product:
//! - `llm`: one `Provider` adapter per vendor wire protocol, plus a
//!   retry/fallback router that is itself a provider.
//! - `tools` + `agents`: a tool registry with a bounded LLM<->tools loop,
//!   specialist analyst agents sharing one base lifecycle, and an
//!   orchestrator that fans five analysts out and synthesizes a verdict.
//! - `financeql`: a query language (lexer -> parser -> typed evaluator)
//!   over financial time series with a ~60-function builtin library.
//! - `backtest`: a deterministic bar-serial simulator with a pending-order
//!   book and derived performance metrics.
//!
//! HTTP/WebSocket servers, CLIs and concrete market-data clients live
//! outside this crate; everything here programs against the `DataSource`
//! capability and a caller-supplied `CancellationToken`.

pub mod agents;
pub mod backtest;
pub mod data;
pub mod error;
pub mod financeql;
pub mod llm;
pub mod ta;
pub mod tools;

pub use agents::{
    Agent, AgentConfig, AgentResult, AgentRole, AnalysisResult, Orchestrator, OrchestratorConfig,
    OrchestratorMode,
};
pub use backtest::{BacktestResult, Backtester, EngineConfig, Strategy};
pub use data::{Bar, DataSource};
pub use error::{BacktestError, LlmError, LlmResult, QlError};
pub use financeql::{Engine as FinanceQl, Value};
pub use llm::{
    AnthropicProvider, ChatOptions, ChatResponse, Complexity, GeminiProvider, LocalProvider,
    Message, OpenAiProvider, Provider, Role, Router, RouterConfig, StreamChunk, ToolCall,
};
pub use tools::{Tool, ToolRegistry};
