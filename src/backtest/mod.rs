//! Backtest engine: a deterministic bar-serial simulator.
//!
//! Replays historical bars through a `Strategy`, executing the pending-order
//! book against each bar's OHLC, recording a per-bar equity curve, and
//! deriving performance metrics. Given identical bars, config and strategy,
//! results are byte-identical across runs.

mod context;
mod engine;
pub mod metrics;
mod strategy;
mod types;

pub use context::StrategyContext;
pub use engine::Backtester;
pub use strategy::{BuyAndHold, RsiReversion, SmaCrossover, Strategy};
pub use types::{
    BacktestResult, Bar, EngineConfig, EquityPoint, Metrics, Order, OrderSide, OrderType,
    Position, SkippedOrder, Trade,
};
