//! Backtest domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::data::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// An order sitting in the pending book. Placed during one bar's strategy
/// callback, eligible for execution from the next bar on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: f64,
    /// Limit or stop level; None for market orders.
    pub price: Option<f64>,
    pub reason: String,
    pub placed_at_bar: usize,
}

/// A realized round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    /// Cost basis per share, commission included.
    pub entry_px: f64,
    pub exit_px: f64,
    pub qty: f64,
    pub pnl: f64,
    pub reason: String,
}

/// Signed quantity plus average cost (commission folded into the basis).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub qty: f64,
    pub avg_cost: f64,
    /// Bar index and date of the oldest open entry.
    pub entry_bar: usize,
    pub entry_date: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.qty != 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.qty * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.avg_cost) * self.qty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// An order the simulator could not fill; recorded, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedOrder {
    pub order: Order,
    pub reason: String,
    pub bar_index: usize,
}

/// Derived performance metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Winning trades as a percentage of all trades.
    pub win_rate: f64,
    pub avg_win: f64,
    /// Negative number: the average losing trade.
    pub avg_loss: f64,
    /// Gross wins over gross losses; infinite when nothing was lost.
    pub profit_factor: f64,
    pub trade_count: usize,
}

/// Full result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub ticker: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub skipped_orders: Vec<SkippedOrder>,
    pub metrics: Metrics,
}

/// Engine tuning. Percentages are human units: `slippage_pct: 0.1` is 0.1%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub slippage_pct: f64,
    pub commission_pct: f64,
    /// Annualized risk-free rate in %, for Sharpe/Sortino.
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000.0,
            slippage_pct: 0.0,
            commission_pct: 0.0,
            risk_free_rate: 6.5,
        }
    }
}
