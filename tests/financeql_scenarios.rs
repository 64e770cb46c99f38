//! FinanceQL black-box scenarios through the public engine API.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::seeded_source;
use niveshak::financeql::{parse, Engine, ExprKind, FunctionRegistry, Value};
use niveshak::QlError;

#[tokio::test]
async fn arithmetic_and_nan_division() {
    let engine = Engine::new(seeded_source());
    let ctx = CancellationToken::new();

    assert_eq!(
        engine.eval(&ctx, "(10 + 5) * 2 - 3").await.unwrap(),
        Value::Scalar(27.0)
    );
    let Value::Scalar(nan) = engine.eval(&ctx, "100 / 0").await.unwrap() else {
        panic!("expected scalar");
    };
    assert!(nan.is_nan());
}

#[tokio::test]
async fn pipe_prepends_value_to_function_arguments() {
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
    let engine = Engine::with_functions(seeded_source(), functions);
    let ctx = CancellationToken::new();

    assert_eq!(engine.eval(&ctx, "21 | double(*)").await.unwrap(), Value::Scalar(42.0));
}

#[test]
fn range_selector_parse_shape() {
    let expr = parse("price(RELIANCE)[30d]").unwrap();
    let ExprKind::Range { inner, duration, days } = expr.kind else {
        panic!("expected a range selector");
    };
    assert_eq!(duration, "30d");
    assert_eq!(days, 30);
    let ExprKind::Call { name, .. } = inner.kind else {
        panic!("expected a call inside the range");
    };
    assert_eq!(name, "price");
}

#[tokio::test]
async fn screening_and_ranking_pipeline() {
    let engine = Engine::new(seeded_source());
    let ctx = CancellationToken::new();

    // Both seeded tickers clear the PE bar; everything else in the universe
    // has no data and is skipped.
    let value = engine
        .eval(&ctx, "screener(pe(*) > 0 and pe(*) < 30)")
        .await
        .unwrap();
    let Value::Table(rows) = value else { panic!("expected table") };
    let tickers: Vec<String> =
        rows.iter().map(|row| row["ticker"].to_string()).collect();
    assert_eq!(tickers, vec!["RELIANCE".to_string(), "TCS".to_string()]);
}

#[tokio::test]
async fn parse_error_carries_position() {
    let engine = Engine::new(seeded_source());
    let ctx = CancellationToken::new();

    let err = engine.eval(&ctx, ")").await.unwrap_err();
    let QlError::Parse { line, column, .. } = err else {
        panic!("expected parse error, got {err:?}");
    };
    assert_eq!(line, 1);
    assert_eq!(column, 1);
}

#[tokio::test]
async fn comparison_chain_rejected() {
    let engine = Engine::new(seeded_source());
    let ctx = CancellationToken::new();
    let err = engine.eval(&ctx, "1 < 2 < 3").await.unwrap_err();
    assert!(matches!(err, QlError::Parse { .. }));
}

#[tokio::test]
async fn indicator_pipeline_over_real_series() {
    let engine = Engine::new(seeded_source());
    let ctx = CancellationToken::new();

    // Seeded history rises monotonically, so the 20-day SMA sits below the
    // latest close.
    let Value::Bool(above) = engine
        .eval(&ctx, "price(RELIANCE) > sma(RELIANCE, 20)")
        .await
        .unwrap()
    else {
        panic!("expected bool");
    };
    assert!(above);

    let Value::Scalar(rsi) = engine.eval(&ctx, "rsi(RELIANCE, 14)").await.unwrap() else {
        panic!("expected scalar");
    };
    assert!(rsi > 50.0);
}
