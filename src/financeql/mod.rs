//! FinanceQL: a PromQL-flavored query language over financial time series.
//!
//! Pipeline: lexer -> recursive-descent parser -> typed tree-walk evaluator
//! backed by a ~60-function builtin library and a TTL cache. The engine is a
//! deterministic computation core: all I/O goes through the injected
//! `DataSource`, so identical data yields identical values.

pub mod ast;
pub mod cache;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use cache::{EvalCache, DEFAULT_TTL};
pub use eval::EvalContext;
pub use functions::{BuiltinFn, FunctionRegistry};
pub use parser::parse;
pub use value::{Point, Row, Value};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::data::DataSource;
use crate::error::QlError;

/// Query engine: owns the builtin registry and the TTL cache, borrows the
/// data source. Construct once, evaluate many.
pub struct Engine {
    source: Arc<dyn DataSource>,
    cache: Arc<EvalCache>,
    functions: Arc<FunctionRegistry>,
}

impl Engine {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self::with_ttl(source, DEFAULT_TTL)
    }

    pub fn with_ttl(source: Arc<dyn DataSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Arc::new(EvalCache::new(ttl)),
            functions: Arc::new(FunctionRegistry::builtins()),
        }
    }

    /// Engine with extra functions layered over the builtins.
    pub fn with_functions(source: Arc<dyn DataSource>, functions: FunctionRegistry) -> Self {
        Self {
            source,
            cache: Arc::new(EvalCache::default()),
            functions: Arc::new(functions),
        }
    }

    /// Parse and evaluate a query.
    pub async fn eval(&self, ctx: &CancellationToken, query: &str) -> Result<Value, QlError> {
        let expr = parse(query)?;
        self.eval_expr(ctx, &expr).await
    }

    /// Evaluate an already-parsed expression.
    pub async fn eval_expr(&self, ctx: &CancellationToken, expr: &Expr) -> Result<Value, QlError> {
        let eval_ctx = EvalContext::new(
            self.source.clone(),
            self.cache.clone(),
            self.functions.clone(),
            ctx.clone(),
        );
        eval::eval(&eval_ctx, expr).await
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    /// User-facing builtin listing (internal `_` names hidden).
    pub fn functions(&self) -> Vec<String> {
        self.functions.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bar, Financials, Quote, StaticDataSource};
    use chrono::{TimeZone, Utc};

    fn seeded_engine() -> Engine {
        let source = StaticDataSource::new();
        source.insert_quote(Quote {
            ticker: "RELIANCE".into(),
            price: 2840.5,
            change: 12.5,
            change_pct: 0.44,
            volume: 4_500_000,
            day_open: 2825.0,
            day_high: 2855.0,
            day_low: 2810.0,
            prev_close: 2828.0,
            timestamp: Utc::now(),
        });
        source.insert_financials(Financials {
            ticker: "RELIANCE".into(),
            pe_ratio: 24.5,
            roe: 9.2,
            ..Default::default()
        });
        let bars: Vec<Bar> = (0..240)
            .map(|i| {
                let close = 2500.0 + i as f64;
                Bar {
                    timestamp: Utc::now() - chrono::Duration::days(240 - i as i64),
                    open: close - 2.0,
                    high: close + 5.0,
                    low: close - 5.0,
                    close,
                    volume: 1_000_000,
                }
            })
            .collect();
        source.insert_history("RELIANCE", bars);
        Engine::new(Arc::new(source))
    }

    fn custom_engine() -> Engine {
        // `double(x) = x * 2` on top of the builtins.
        let source = StaticDataSource::new();
        let mut functions = FunctionRegistry::builtins();
        functions.register(
            "double",
            Arc::new(|_ctx, args| {
                Box::pin(async move {
                    let x = args.first().map(Value::to_scalar).unwrap_or(0.0);
                    Ok(Value::Scalar(x * 2.0))
                })
            }),
        );
        Engine::with_functions(Arc::new(source), functions)
    }

    #[tokio::test]
    async fn test_arithmetic() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "(10 + 5) * 2 - 3").await.unwrap();
        assert_eq!(value, Value::Scalar(27.0));
    }

    #[tokio::test]
    async fn test_division_by_zero_is_nan() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let Value::Scalar(v) = engine.eval(&ctx, "100 / 0").await.unwrap() else {
            panic!("expected scalar");
        };
        assert!(v.is_nan());
    }

    #[tokio::test]
    async fn test_pipe_with_star_placeholder() {
        let engine = custom_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "21 | double(*)").await.unwrap();
        assert_eq!(value, Value::Scalar(42.0));
    }

    #[tokio::test]
    async fn test_pipe_prepends_when_no_star() {
        let engine = custom_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "21 | double()").await.unwrap();
        assert_eq!(value, Value::Scalar(42.0));
    }

    #[tokio::test]
    async fn test_price_lookup_and_cache() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "price(RELIANCE)").await.unwrap();
        assert_eq!(value, Value::Scalar(2840.5));
        assert!(engine.cache().get("price:RELIANCE").is_some());
    }

    #[tokio::test]
    async fn test_bare_identifier_resolves_as_ticker() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "RELIANCE > 1000").await.unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_range_selector_returns_window() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "price(RELIANCE)[30d]").await.unwrap();
        let Value::Vector(points) = value else { panic!("expected vector") };
        assert_eq!(points.len(), 30);
        // Latest close is the last point.
        assert_eq!(points.last().unwrap().value, 2739.0);
    }

    #[tokio::test]
    async fn test_aggregation_over_range() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "avg(price(RELIANCE)[10d])").await.unwrap();
        let Value::Scalar(avg) = value else { panic!("expected scalar") };
        // Closes 2730..=2739 average to 2734.5.
        assert!((avg - 2734.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_technical_over_pipe() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "price(RELIANCE)[60d] | rsi(*, 14)").await.unwrap();
        let Value::Scalar(rsi) = value else { panic!("expected scalar") };
        // Monotonic uptrend pins RSI at 100.
        assert!((rsi - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_string_comparison_case_insensitive() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        assert_eq!(
            engine.eval(&ctx, "trend(RELIANCE) == \"UPTREND\"").await.unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            engine.eval(&ctx, "\"abc\" != 'ABC'").await.unwrap(),
            Value::Bool(false)
        );
    }

    #[tokio::test]
    async fn test_empty_vector_boundaries() {
        let mut functions = FunctionRegistry::builtins();
        functions.register(
            "empty_vec",
            Arc::new(|_ctx, _args| Box::pin(async { Ok(Value::Vector(vec![])) })),
        );
        let engine = Engine::with_functions(Arc::new(StaticDataSource::new()), functions);
        let ctx = CancellationToken::new();
        assert_eq!(engine.eval(&ctx, "first(empty_vec())").await.unwrap(), Value::Nil);
        assert_eq!(engine.eval(&ctx, "last(empty_vec())").await.unwrap(), Value::Nil);
        assert_eq!(engine.eval(&ctx, "avg(empty_vec())").await.unwrap(), Value::Scalar(0.0));
        assert_eq!(engine.eval(&ctx, "sum(empty_vec())").await.unwrap(), Value::Scalar(0.0));
        assert_eq!(engine.eval(&ctx, "count(empty_vec())").await.unwrap(), Value::Scalar(0.0));
    }

    #[tokio::test]
    async fn test_unknown_function_is_eval_error() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let err = engine.eval(&ctx, "definitely_not_a_function(1)").await.unwrap_err();
        assert!(matches!(err, QlError::Eval(_)));
        assert!(err.to_string().contains("unknown function"));
    }

    #[tokio::test]
    async fn test_purity_two_consecutive_evaluations() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let query = "sma(RELIANCE, 20) + rsi(RELIANCE, 14) * 2";
        let first = engine.eval(&ctx, query).await.unwrap();
        engine.cache().clear();
        let second = engine.eval(&ctx, query).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_alert_triggers_with_message() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine
            .eval(&ctx, "alert(price(RELIANCE) > 1000, 'above 1000')")
            .await
            .unwrap();
        assert_eq!(value, Value::Str("above 1000".into()));
        let value = engine.eval(&ctx, "alert(price(RELIANCE) > 99999)").await.unwrap();
        assert_eq!(value, Value::Nil);
    }

    #[tokio::test]
    async fn test_screener_over_universe() {
        // Only RELIANCE has financials; the screen tolerates every other
        // missing name and matches just the one.
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "screener(pe(*) < 30 and pe(*) > 0)").await.unwrap();
        let Value::Table(rows) = value else { panic!("expected table") };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ticker"], Value::Str("RELIANCE".into()));
    }

    #[tokio::test]
    async fn test_index_membership_tables() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        let value = engine.eval(&ctx, "count(nifty50())").await.unwrap();
        let Value::Scalar(n) = value else { panic!() };
        assert!(n >= 45.0);
        let value = engine.eval(&ctx, "count(niftybank())").await.unwrap();
        let Value::Scalar(n) = value else { panic!() };
        assert!(n >= 8.0);
    }

    #[tokio::test]
    async fn test_indian_scale_arithmetic() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        assert_eq!(engine.eval(&ctx, "1cr / 1l").await.unwrap(), Value::Scalar(100.0));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let engine = seeded_engine();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = engine.eval(&ctx, "1 + 1").await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_function_listing_hides_internal() {
        let engine = seeded_engine();
        let names = engine.functions();
        assert!(names.iter().any(|n| n == "price"));
        assert!(names.iter().all(|n| !n.starts_with('_')));
    }
}
