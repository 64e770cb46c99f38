//! Fundamental ratio builtins.
//!
//! Every function takes a ticker, reads the fundamentals snapshot and
//! returns one figure as a scalar, cached per `<name>:<ticker>`. Missing
//! figures come back as 0; consumers treat zero as "not reported".

use std::sync::Arc;

use super::{arg_ticker, cached_scalar, FunctionRegistry};
use crate::data::Financials;
use crate::error::QlError;

pub fn register(registry: &mut FunctionRegistry) {
    field(registry, "pe", |f| f.pe_ratio);
    field(registry, "pb", |f| f.pb_ratio);
    field(registry, "roe", |f| f.roe);
    field(registry, "roce", |f| f.roce);
    field(registry, "eps", |f| f.eps);
    field(registry, "book_value", |f| f.book_value);
    field(registry, "debt_to_equity", |f| f.debt_to_equity);
    field(registry, "dividend_yield", |f| f.dividend_yield);
    field(registry, "market_cap", |f| f.market_cap);
    field(registry, "revenue", |f| f.revenue);
    field(registry, "net_profit", |f| f.net_profit);
    field(registry, "operating_margin", |f| f.operating_margin);
    field(registry, "net_margin", |f| f.net_margin);
    field(registry, "revenue_growth", |f| f.revenue_growth_yoy);
    field(registry, "profit_growth", |f| f.profit_growth_yoy);
    field(registry, "promoter_holding", |f| f.promoter_holding);
}

fn field(registry: &mut FunctionRegistry, name: &'static str, extract: fn(&Financials) -> f64) {
    registry.register(
        name,
        Arc::new(move |ctx, args| {
            Box::pin(async move {
                let ticker = arg_ticker(name, &args, 0)?;
                let fetch_ticker = ticker.clone();
                cached_scalar(ctx, name, &ticker, move || {
                    Box::pin(async move {
                        let financials = ctx
                            .source
                            .get_financials(&fetch_ticker)
                            .await
                            .map_err(|e| QlError::eval(format!("{name}({fetch_ticker}): {e}")))?;
                        Ok(extract(&financials))
                    })
                })
                .await
            })
        }),
    );
}
