//! Aggregation and utility builtins over vectors.
//!
//! Numeric aggregations over an empty vector return 0; `first`/`last`
//! return Nil, letting callers distinguish "no data" from "zero".

use std::sync::Arc;

use super::{arg_number, FunctionRegistry};
use crate::financeql::value::Value;
use crate::ta;

pub fn register(registry: &mut FunctionRegistry) {
    reduce(registry, "avg", |series| {
        if series.is_empty() {
            0.0
        } else {
            series.iter().sum::<f64>() / series.len() as f64
        }
    });
    reduce(registry, "sum", |series| series.iter().sum());
    reduce(registry, "min", |series| {
        series.iter().copied().fold(f64::INFINITY, f64::min).min_by_zero()
    });
    reduce(registry, "max", |series| {
        series.iter().copied().fold(f64::NEG_INFINITY, f64::max).max_by_zero()
    });
    reduce(registry, "stddev", |series| ta::stddev(series));

    registry.register(
        "percentile",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let series = args.first().map(Value::series).unwrap_or_default();
                let p = arg_number(&args, 1, 50.0);
                Ok(Value::Scalar(ta::percentile(&series, p)))
            })
        }),
    );

    registry.register(
        "correlation",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let a = args.first().map(Value::series).unwrap_or_default();
                let b = args.get(1).map(Value::series).unwrap_or_default();
                Ok(Value::Scalar(ta::correlation(&a, &b)))
            })
        }),
    );

    registry.register(
        "abs",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                match args.first() {
                    Some(Value::Vector(points)) => {
                        let mapped = points
                            .iter()
                            .map(|p| crate::financeql::value::Point {
                                time: p.time,
                                value: p.value.abs(),
                            })
                            .collect();
                        Ok(Value::Vector(mapped))
                    }
                    Some(other) => Ok(Value::Scalar(other.to_scalar().abs())),
                    None => Ok(Value::Scalar(0.0)),
                }
            })
        }),
    );

    registry.register(
        "count",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let n = match args.first() {
                    Some(Value::Vector(points)) => points.len(),
                    Some(Value::Table(rows)) => rows.len(),
                    Some(Value::Matrix(m)) => m.len(),
                    Some(Value::Nil) | None => 0,
                    Some(_) => 1,
                };
                Ok(Value::Scalar(n as f64))
            })
        }),
    );

    registry.register(
        "first",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                match args.first() {
                    Some(Value::Vector(points)) => Ok(points
                        .first()
                        .map(|p| Value::Scalar(p.value))
                        .unwrap_or(Value::Nil)),
                    Some(other) => Ok(other.clone()),
                    None => Ok(Value::Nil),
                }
            })
        }),
    );

    registry.register(
        "last",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                match args.first() {
                    Some(Value::Vector(points)) => Ok(points
                        .last()
                        .map(|p| Value::Scalar(p.value))
                        .unwrap_or(Value::Nil)),
                    Some(other) => Ok(other.clone()),
                    None => Ok(Value::Nil),
                }
            })
        }),
    );
}

fn reduce(registry: &mut FunctionRegistry, name: &'static str, f: fn(&[f64]) -> f64) {
    registry.register(
        name,
        Arc::new(move |_ctx, args| {
            Box::pin(async move {
                let series = match args.first() {
                    Some(Value::Vector(points)) => {
                        points.iter().map(|p| p.value).collect::<Vec<f64>>()
                    }
                    Some(Value::Nil) | None => Vec::new(),
                    Some(other) => vec![other.to_scalar()],
                };
                Ok(Value::Scalar(f(&series)))
            })
        }),
    );
}

/// Empty-input folds land on +/-infinity; clamp those to 0.
trait ZeroOnEmpty {
    fn min_by_zero(self) -> f64;
    fn max_by_zero(self) -> f64;
}

impl ZeroOnEmpty for f64 {
    fn min_by_zero(self) -> f64 {
        if self.is_infinite() {
            0.0
        } else {
            self
        }
    }
    fn max_by_zero(self) -> f64 {
        if self.is_infinite() {
            0.0
        } else {
            self
        }
    }
}
