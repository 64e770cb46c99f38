//! Index membership and screening builtins.

use std::cmp::Ordering;
use std::sync::Arc;

use super::{arg_number, FunctionRegistry};
use crate::error::QlError;
use crate::financeql::value::{Row, Value};

/// NIFTY 50 membership; doubles as the screener universe.
pub(crate) const NIFTY50: &[&str] = &[
    "ADANIENT", "ADANIPORTS", "APOLLOHOSP", "ASIANPAINT", "AXISBANK", "BAJFINANCE",
    "BAJAJFINSV", "BHARTIARTL", "BPCL", "BRITANNIA", "CIPLA", "COALINDIA", "DIVISLAB",
    "DRREDDY", "EICHERMOT", "GRASIM", "HCLTECH", "HDFCBANK", "HDFCLIFE", "HEROMOTOCO",
    "HINDALCO", "HINDUNILVR", "ICICIBANK", "INDUSINDBK", "INFY", "ITC", "JSWSTEEL",
    "KOTAKBANK", "LT", "M&M", "MARUTI", "NESTLEIND", "NTPC", "ONGC", "POWERGRID",
    "RELIANCE", "SBILIFE", "SBIN", "SUNPHARMA", "TATACONSUM", "TATAMOTORS", "TATASTEEL",
    "TCS", "TECHM", "TITAN", "ULTRACEMCO", "UPL", "WIPRO",
];

pub(crate) const NIFTYBANK: &[&str] = &[
    "AXISBANK", "BANDHANBNK", "FEDERALBNK", "HDFCBANK", "ICICIBANK", "IDFCFIRSTB",
    "INDUSINDBK", "KOTAKBANK", "PNB", "SBIN",
];

fn members_table(members: &[&str]) -> Value {
    let rows: Vec<Row> = members
        .iter()
        .map(|ticker| {
            let mut row = Row::new();
            row.insert("ticker".to_string(), Value::Str((*ticker).to_string()));
            row
        })
        .collect();
    Value::Table(rows)
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "nifty50",
        Arc::new(|_ctx, _args| Box::pin(async { Ok(members_table(NIFTY50)) })),
    );

    registry.register(
        "niftybank",
        Arc::new(|_ctx, _args| Box::pin(async { Ok(members_table(NIFTYBANK)) })),
    );

    registry.register(
        "sort",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                match args.first() {
                    Some(Value::Vector(points)) => {
                        let mut sorted = points.clone();
                        sorted.sort_by(|a, b| compare(a.value, b.value));
                        Ok(Value::Vector(sorted))
                    }
                    Some(Value::Table(rows)) => {
                        let column = match args.get(1) {
                            Some(Value::Str(name)) => name.clone(),
                            _ => "ticker".to_string(),
                        };
                        let mut sorted = rows.clone();
                        sorted.sort_by(|a, b| compare_rows(a, b, &column));
                        Ok(Value::Table(sorted))
                    }
                    Some(other) => Ok(other.clone()),
                    None => Ok(Value::Nil),
                }
            })
        }),
    );

    rank(registry, "top", true);
    rank(registry, "bottom", false);

    registry.register(
        "where",
        Arc::new(|_ctx, args| {
            Box::pin(async move {
                let Some(Value::Table(rows)) = args.first() else {
                    return Err(QlError::eval("where: first argument must be a table"));
                };
                let Some(Value::Str(column)) = args.get(1) else {
                    return Err(QlError::eval("where: second argument must be a column name"));
                };
                let Some(Value::Str(op)) = args.get(2) else {
                    return Err(QlError::eval(
                        "where: third argument must be an operator string",
                    ));
                };
                let threshold = arg_number(&args, 3, 0.0);

                let filtered: Vec<Row> = rows
                    .iter()
                    .filter(|row| {
                        let value =
                            row.get(column.as_str()).map(Value::to_scalar).unwrap_or(0.0);
                        match op.as_str() {
                            ">" => value > threshold,
                            "<" => value < threshold,
                            ">=" => value >= threshold,
                            "<=" => value <= threshold,
                            "==" | "=" => value == threshold,
                            "!=" => value != threshold,
                            _ => false,
                        }
                    })
                    .cloned()
                    .collect();
                Ok(Value::Table(filtered))
            })
        }),
    );
}

/// `top(v, n)` / `bottom(v, n)` over vectors (by value) and tables (by the
/// column named in the third argument).
fn rank(registry: &mut FunctionRegistry, name: &'static str, descending: bool) {
    registry.register(
        name,
        Arc::new(move |_ctx, args| {
            Box::pin(async move {
                let n = arg_number(&args, 1, 5.0).max(0.0) as usize;
                match args.first() {
                    Some(Value::Vector(points)) => {
                        let mut sorted = points.clone();
                        sorted.sort_by(|a, b| compare(a.value, b.value));
                        if descending {
                            sorted.reverse();
                        }
                        sorted.truncate(n);
                        Ok(Value::Vector(sorted))
                    }
                    Some(Value::Table(rows)) => {
                        let column = match args.get(2) {
                            Some(Value::Str(name)) => name.clone(),
                            _ => "value".to_string(),
                        };
                        let mut sorted = rows.clone();
                        sorted.sort_by(|a, b| compare_rows(a, b, &column));
                        if descending {
                            sorted.reverse();
                        }
                        sorted.truncate(n);
                        Ok(Value::Table(sorted))
                    }
                    Some(other) => Ok(other.clone()),
                    None => Ok(Value::Nil),
                }
            })
        }),
    );
}

fn compare(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn compare_rows(a: &Row, b: &Row, column: &str) -> Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Value::Str(x)), Some(Value::Str(y))) => x.cmp(y),
        (x, y) => compare(
            x.map(Value::to_scalar).unwrap_or(0.0),
            y.map(Value::to_scalar).unwrap_or(0.0),
        ),
    }
}
