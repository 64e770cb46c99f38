//! Price and market lookup builtins.

use std::sync::Arc;

use super::{arg_number, arg_ticker, cached_scalar, closes, fetch_bars, FunctionRegistry};
use crate::financeql::value::{Point, Value};
use crate::error::QlError;

const DEFAULT_RANGE_DAYS: f64 = 30.0;

pub fn register(registry: &mut FunctionRegistry) {
    quote_field(registry, "price", |q| q.price);
    quote_field(registry, "open", |q| q.day_open);
    quote_field(registry, "high", |q| q.day_high);
    quote_field(registry, "low", |q| q.day_low);
    quote_field(registry, "prev_close", |q| q.prev_close);
    quote_field(registry, "volume", |q| q.volume as f64);
    quote_field(registry, "change", |q| q.change);
    quote_field(registry, "change_pct", |q| q.change_pct);

    registry.register(
        "price_range",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker("price_range", &args, 0)?;
                let days = arg_number(&args, 1, DEFAULT_RANGE_DAYS) as i64;
                let points = closes(ctx, &ticker, days).await?;
                if points.is_empty() {
                    return Ok(Value::Nil);
                }
                Ok(Value::Vector(points))
            })
        }),
    );

    registry.register(
        "volume_range",
        Arc::new(|ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker("volume_range", &args, 0)?;
                let days = arg_number(&args, 1, DEFAULT_RANGE_DAYS) as i64;
                let key = format!("volume_range:{ticker}:{days}");
                if let Some(value) = ctx.cache.get(&key) {
                    return Ok(value);
                }
                let bars = fetch_bars(ctx, &ticker, days).await?;
                let points: Vec<Point> = bars
                    .iter()
                    .rev()
                    .take(days.max(0) as usize)
                    .rev()
                    .map(|b| Point { time: b.timestamp, value: b.volume as f64 })
                    .collect();
                if points.is_empty() {
                    return Ok(Value::Nil);
                }
                let value = Value::Vector(points);
                ctx.cache.set(key, value.clone());
                Ok(value)
            })
        }),
    );
}

/// Register a scalar builtin reading one quote field, cached per ticker.
fn quote_field(
    registry: &mut FunctionRegistry,
    name: &'static str,
    extract: fn(&crate::data::Quote) -> f64,
) {
    registry.register(
        name,
        Arc::new(move |ctx, args| {
            Box::pin(async move {
                // Piped non-string input degrades to plain coercion so
                // `price(X) | abs(*)`-style chains stay composable.
                match args.first() {
                    Some(Value::Str(_)) => {}
                    Some(other) => return Ok(Value::Scalar(other.to_scalar())),
                    None => return Err(QlError::eval(format!("{name}: missing ticker argument"))),
                }
                let ticker = arg_ticker(name, &args, 0)?;
                let fetch_ticker = ticker.clone();
                cached_scalar(ctx, name, &ticker, move || {
                    Box::pin(async move {
                        let quote = ctx
                            .source
                            .get_quote(&fetch_ticker)
                            .await
                            .map_err(|e| QlError::eval(format!("{name}({fetch_ticker}): {e}")))?;
                        Ok(extract(&quote))
                    })
                })
                .await
            })
        }),
    );
}
