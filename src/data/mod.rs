//! Market data capability consumed by agents and FinanceQL.
//!
//! Concrete clients (exchange scrapers, RSS feeds, brokerage adapters) live
//! outside this crate; the core programs against the `DataSource` trait.
//! A source returning an error is non-fatal: tool handlers report it and the
//! caller (or the next source) decides what to do.

mod static_source;

pub use static_source::StaticDataSource;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar. Shared by historical data, FinanceQL vectors and the
/// backtest engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// True range against the previous close (ATR building block).
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Candle interval for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }
}

/// Latest traded snapshot for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub volume: u64,
    pub day_open: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub prev_close: f64,
    pub timestamp: DateTime<Utc>,
}

/// Fundamental snapshot. Missing figures are zero; consumers treat zero as
/// "not reported" and degrade rather than fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Financials {
    pub ticker: String,
    pub market_cap: f64,
    pub revenue: f64,
    pub net_profit: f64,
    pub eps: f64,
    pub book_value: f64,
    pub pe_ratio: f64,
    pub pb_ratio: f64,
    pub roe: f64,
    pub roce: f64,
    pub debt_to_equity: f64,
    pub operating_margin: f64,
    pub net_margin: f64,
    pub revenue_growth_yoy: f64,
    pub profit_growth_yoy: f64,
    pub dividend_yield: f64,
    pub promoter_holding: f64,
}

/// One strike row of an option chain.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OptionStrike {
    pub strike: f64,
    pub call_oi: u64,
    pub call_change_oi: i64,
    pub call_ltp: f64,
    pub call_iv: f64,
    pub put_oi: u64,
    pub put_change_oi: i64,
    pub put_ltp: f64,
    pub put_iv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub ticker: String,
    pub expiry: NaiveDate,
    pub spot: f64,
    pub strikes: Vec<OptionStrike>,
}

impl OptionChain {
    /// Put/call open-interest ratio. Zero call OI yields 0 rather than a
    /// division blowup.
    pub fn put_call_ratio(&self) -> f64 {
        let call_oi: u64 = self.strikes.iter().map(|s| s.call_oi).sum();
        let put_oi: u64 = self.strikes.iter().map(|s| s.put_oi).sum();
        if call_oi == 0 {
            0.0
        } else {
            put_oi as f64 / call_oi as f64
        }
    }

    /// Strike with the highest combined OI: the max-pain approximation the
    /// derivatives agent reports.
    pub fn max_pain(&self) -> f64 {
        self.strikes
            .iter()
            .max_by_key(|s| s.call_oi + s.put_oi)
            .map(|s| s.strike)
            .unwrap_or(0.0)
    }
}

/// Company identity and classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockProfile {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub description: String,
}

/// One news headline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

/// External market data capability.
///
/// Every operation may fail (network, symbol unknown to that source); a
/// failure is reported, never propagated as fatal.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> anyhow::Result<Quote>;

    async fn get_historical(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
        timeframe: Timeframe,
    ) -> anyhow::Result<Vec<Bar>>;

    async fn get_financials(&self, ticker: &str) -> anyhow::Result<Financials>;

    async fn get_option_chain(
        &self,
        ticker: &str,
        expiry: Option<NaiveDate>,
    ) -> anyhow::Result<OptionChain>;

    async fn get_stock_profile(&self, ticker: &str) -> anyhow::Result<StockProfile>;

    async fn get_news(&self, ticker: &str, limit: usize) -> anyhow::Result<Vec<NewsItem>>;
}
