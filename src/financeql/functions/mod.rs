//! Builtin function library.
//!
//! Functions are stored lower-cased, so lookup is case-insensitive. Names
//! prefixed `_` are callable but hidden from user-facing listings. All
//! builtins tolerate missing data: they return Nil or zero rather than
//! failing hard, and data-backed ones go through the TTL cache with
//! `"<kind>:<ticker>[:<period>]"` keys.

mod aggregate;
mod fundamental;
mod market;
mod screener;
mod technical;

pub(crate) use screener::NIFTY50;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;

use super::eval::EvalContext;
use super::value::{Point, Value};
use crate::data::{Bar, Timeframe};
use crate::error::QlError;

/// A builtin: borrows the evaluation context, consumes evaluated arguments.
pub type BuiltinFn = Arc<
    dyn for<'a> Fn(&'a EvalContext, Vec<Value>) -> BoxFuture<'a, Result<Value, QlError>>
        + Send
        + Sync,
>;

#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, BuiltinFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with every builtin group.
    pub fn builtins() -> Self {
        let mut registry = Self::new();
        market::register(&mut registry);
        technical::register(&mut registry);
        fundamental::register(&mut registry);
        aggregate::register(&mut registry);
        screener::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, function: BuiltinFn) {
        self.functions.insert(name.to_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinFn> {
        self.functions.get(&name.to_lowercase())
    }

    pub fn has(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// User-facing function names, sorted; internal `_` names are hidden.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ============================================================================
// Shared argument and fetch helpers
// ============================================================================

/// Required ticker argument at `index`.
pub(crate) fn arg_ticker(name: &str, args: &[Value], index: usize) -> Result<String, QlError> {
    match args.get(index) {
        Some(Value::Str(ticker)) if !ticker.is_empty() => Ok(ticker.to_uppercase()),
        Some(other) => Err(QlError::eval(format!(
            "{name}: expected a ticker at argument {}, got {}",
            index + 1,
            other.kind()
        ))),
        None => Err(QlError::eval(format!("{name}: missing ticker argument"))),
    }
}

/// Optional numeric argument with a default.
pub(crate) fn arg_number(args: &[Value], index: usize, default: f64) -> f64 {
    args.get(index).map(Value::to_scalar).unwrap_or(default)
}

/// Close-price series for the last `days` sessions, cached as
/// `history:<ticker>:<days>`.
pub(crate) async fn closes(
    ctx: &EvalContext,
    ticker: &str,
    days: i64,
) -> Result<Vec<Point>, QlError> {
    let key = format!("history:{ticker}:{days}");
    if let Some(Value::Vector(points)) = ctx.cache.get(&key) {
        return Ok(points);
    }
    let bars = fetch_bars(ctx, ticker, days).await?;
    let points: Vec<Point> = bars
        .iter()
        .rev()
        .take(days.max(0) as usize)
        .rev()
        .map(|b| Point { time: b.timestamp, value: b.close })
        .collect();
    ctx.cache.set(key, Value::Vector(points.clone()));
    Ok(points)
}

/// Raw bars, uncached (bar-shaped data does not fit the value cache).
pub(crate) async fn fetch_bars(
    ctx: &EvalContext,
    ticker: &str,
    days: i64,
) -> Result<Vec<Bar>, QlError> {
    let to = Utc::now().date_naive();
    // Calendar buffer so `days` trading sessions fit.
    let from = to - ChronoDuration::days(days.max(1) * 2);
    ctx.source
        .get_historical(ticker, from, to, Timeframe::Day)
        .await
        .map_err(|e| QlError::eval(format!("historical data for {ticker}: {e}")))
}

/// Scalar fetched through the cache under `<kind>:<ticker>`.
pub(crate) async fn cached_scalar<'a, F>(
    ctx: &'a EvalContext,
    kind: &str,
    ticker: &str,
    fetch: F,
) -> Result<Value, QlError>
where
    F: FnOnce() -> BoxFuture<'a, Result<f64, QlError>>,
{
    let key = format!("{kind}:{ticker}");
    if let Some(value) = ctx.cache.get(&key) {
        return Ok(value);
    }
    let value = Value::Scalar(fetch().await?);
    ctx.cache.set(key, value.clone());
    Ok(value)
}

/// Tail-aligned series points for an indicator computed over closes.
pub(crate) fn aligned_points(source: &[Point], values: Vec<f64>) -> Vec<Point> {
    let offset = source.len().saturating_sub(values.len());
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| Point { time: source[offset + i].time, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let registry = FunctionRegistry::builtins();
        assert!(registry.has("price"));
        assert!(registry.has("PRICE"));
        assert!(registry.has("Rsi"));
    }

    #[test]
    fn test_builtin_coverage() {
        let registry = FunctionRegistry::builtins();
        // The library carries the documented groups.
        for name in [
            "price", "volume", "price_range", "sma", "ema", "rsi", "macd", "atr", "vwap",
            "supertrend", "crossover", "crossunder", "trend", "pe", "pb", "roe", "roce",
            "debt_to_equity", "avg", "sum", "min", "max", "stddev", "percentile", "correlation",
            "abs", "count", "first", "last", "nifty50", "niftybank", "sort", "top", "bottom",
            "where",
        ] {
            assert!(registry.has(name), "missing builtin {name}");
        }
        assert!(registry.len() >= 55, "expected a full library, got {}", registry.len());
    }

    #[test]
    fn test_hidden_functions_not_listed() {
        let mut registry = FunctionRegistry::builtins();
        registry.register(
            "_internal_probe",
            Arc::new(|_ctx, _args| Box::pin(async { Ok(Value::Nil) })),
        );
        assert!(registry.has("_internal_probe"));
        assert!(!registry.names().iter().any(|n| n.starts_with('_')));
    }

    #[test]
    fn test_names_sorted() {
        let registry = FunctionRegistry::builtins();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
