//! Technical indicator builtins.
//!
//! First argument is a ticker (history is fetched and cached) or a Vector
//! piped in from an earlier stage. Instant forms return the latest scalar;
//! `_range` siblings back the postfix `[Nd]` selector with full series.

use std::sync::Arc;

use super::{aligned_points, arg_number, arg_ticker, closes, fetch_bars, FunctionRegistry};
use crate::error::QlError;
use crate::financeql::eval::EvalContext;
use crate::financeql::value::{Point, Value};
use crate::ta;

/// Resolve the leading series argument: fetch for tickers, reuse vectors.
async fn series_arg(
    ctx: &EvalContext,
    name: &str,
    args: &[Value],
    lookback: i64,
) -> Result<Vec<Point>, QlError> {
    match args.first() {
        Some(Value::Str(ticker)) => closes(ctx, &ticker.to_uppercase(), lookback).await,
        Some(Value::Vector(points)) => Ok(points.clone()),
        Some(other) => Err(QlError::eval(format!(
            "{name}: expected ticker or vector, got {}",
            other.kind()
        ))),
        None => Err(QlError::eval(format!("{name}: missing argument"))),
    }
}

fn last_or_nil(values: &[f64]) -> Value {
    match values.last() {
        Some(&v) => Value::Scalar(v),
        None => Value::Nil,
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "sma",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let points = series_arg(ctx, "sma", &args, (period * 3) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                Ok(last_or_nil(&ta::sma(&series, period)))
            })
        }),
    );

    registry.register(
        "sma_range",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let days = arg_number(&args, 2, 30.0).max(1.0) as i64;
                let points =
                    series_arg(ctx, "sma_range", &args, days + (period * 2) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let mut out = aligned_points(&points, ta::sma(&series, period));
                let keep = out.len().saturating_sub(days as usize);
                Ok(Value::Vector(out.split_off(keep)))
            })
        }),
    );

    registry.register(
        "ema",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let points = series_arg(ctx, "ema", &args, (period * 3) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                Ok(last_or_nil(&ta::ema(&series, period)))
            })
        }),
    );

    registry.register(
        "ema_range",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let days = arg_number(&args, 2, 30.0).max(1.0) as i64;
                let points =
                    series_arg(ctx, "ema_range", &args, days + (period * 2) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let mut out = aligned_points(&points, ta::ema(&series, period));
                let keep = out.len().saturating_sub(days as usize);
                Ok(Value::Vector(out.split_off(keep)))
            })
        }),
    );

    registry.register(
        "rsi",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 14.0).max(1.0) as usize;
                let points = series_arg(ctx, "rsi", &args, (period * 4) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                Ok(last_or_nil(&ta::rsi(&series, period)))
            })
        }),
    );

    registry.register(
        "rsi_range",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 14.0).max(1.0) as usize;
                let days = arg_number(&args, 2, 30.0).max(1.0) as i64;
                let points =
                    series_arg(ctx, "rsi_range", &args, days + (period * 3) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let mut out = aligned_points(&points, ta::rsi(&series, period));
                let keep = out.len().saturating_sub(days as usize);
                Ok(Value::Vector(out.split_off(keep)))
            })
        }),
    );

    macd_component(registry, "macd", 0);
    macd_component(registry, "macd_signal", 1);
    macd_component(registry, "macd_histogram", 2);

    registry.register(
        "bollinger",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let k = arg_number(&args, 2, 2.0);
                let points = series_arg(ctx, "bollinger", &args, (period * 3) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let (middle, upper, lower) = ta::bollinger(&series, period, k);
                if middle.is_empty() {
                    return Ok(Value::Nil);
                }
                let mut bands = std::collections::BTreeMap::new();
                bands.insert("lower".to_string(), aligned_points(&points, lower));
                bands.insert("middle".to_string(), aligned_points(&points, middle));
                bands.insert("upper".to_string(), aligned_points(&points, upper));
                Ok(Value::Matrix(bands))
            })
        }),
    );

    bollinger_band(registry, "bollinger_upper", |upper, _, _| upper);
    bollinger_band(registry, "bollinger_middle", |_, middle, _| middle);
    bollinger_band(registry, "bollinger_lower", |_, _, lower| lower);

    registry.register(
        "atr",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker("atr", &args, 0)?;
                let period = arg_number(&args, 1, 14.0).max(1.0) as usize;
                let bars = fetch_bars(ctx, &ticker, (period * 4) as i64).await?;
                Ok(last_or_nil(&ta::atr(&bars, period)))
            })
        }),
    );

    registry.register(
        "vwap",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker("vwap", &args, 0)?;
                let days = arg_number(&args, 1, 30.0).max(1.0) as i64;
                let bars = fetch_bars(ctx, &ticker, days).await?;
                if bars.is_empty() {
                    return Ok(Value::Nil);
                }
                let tail: Vec<_> =
                    bars.iter().rev().take(days as usize).rev().copied().collect();
                Ok(Value::Scalar(ta::vwap(&tail)))
            })
        }),
    );

    registry.register(
        "supertrend",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker("supertrend", &args, 0)?;
                let period = arg_number(&args, 1, 10.0).max(1.0) as usize;
                let multiplier = arg_number(&args, 2, 3.0);
                let bars = fetch_bars(ctx, &ticker, (period * 5) as i64).await?;
                let (line, _) = ta::supertrend(&bars, period, multiplier);
                Ok(last_or_nil(&line))
            })
        }),
    );

    registry.register(
        "crossover",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let a = args.first().map(Value::series).unwrap_or_default();
                let b = args.get(1).map(Value::series).unwrap_or_default();
                Ok(Value::Bool(ta::crossover(&a, &b)))
            })
        }),
    );

    registry.register(
        "crossunder",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let a = args.first().map(Value::series).unwrap_or_default();
                let b = args.get(1).map(Value::series).unwrap_or_default();
                Ok(Value::Bool(ta::crossunder(&a, &b)))
            })
        }),
    );

    registry.register(
        "trend",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let days = arg_number(&args, 1, 30.0).max(2.0) as i64;
                let points = series_arg(ctx, "trend", &args, days).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                if series.len() < 2 {
                    return Ok(Value::Nil);
                }
                let slope = ta::trend_slope(&series);
                let mean = series.iter().sum::<f64>() / series.len() as f64;
                // Relative slope so expensive stocks are not all "trending".
                let relative = if mean != 0.0 { slope / mean } else { 0.0 };
                let label = if relative > 0.001 {
                    "uptrend"
                } else if relative < -0.001 {
                    "downtrend"
                } else {
                    "sideways"
                };
                Ok(Value::Str(label.to_string()))
            })
        }),
    );
}

fn macd_component(registry: &mut FunctionRegistry, name: &'static str, component: usize) {
    registry.register(
        name,
        Arc::new(move |ctx, args| {
            Box::pin(async move {
                let points = series_arg(ctx, name, &args, 90).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let (line, signal, histogram) = ta::macd(&series, 12, 26, 9);
                let target = match component {
                    0 => &line,
                    1 => &signal,
                    _ => &histogram,
                };
                Ok(last_or_nil(target))
            })
        }),
    );
}

fn bollinger_band(
    registry: &mut FunctionRegistry,
    name: &'static str,
    pick: fn(Vec<f64>, Vec<f64>, Vec<f64>) -> Vec<f64>,
) {
    registry.register(
        name,
        Arc::new(move |ctx, args| {
            Box::pin(async move {
                let period = arg_number(&args, 1, 20.0).max(1.0) as usize;
                let k = arg_number(&args, 2, 2.0);
                let points = series_arg(ctx, name, &args, (period * 3) as i64).await?;
                let series: Vec<f64> = points.iter().map(|p| p.value).collect();
                let (middle, upper, lower) = ta::bollinger(&series, period, k);
                Ok(last_or_nil(&pick(upper, middle, lower)))
            })
        }),
    );
}
