//! Performance metrics derived from the equity curve and trade list.

use super::types::{EquityPoint, Metrics, Trade};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Compute the full metrics block. `risk_free_rate` is annualized, in %.
pub fn compute(
    equity: &[EquityPoint],
    trades: &[Trade],
    initial_capital: f64,
    risk_free_rate: f64,
) -> Metrics {
    let mut metrics = Metrics { trade_count: trades.len(), ..Default::default() };
    let Some(last) = equity.last() else {
        return metrics;
    };
    let first = &equity[0];

    if initial_capital > 0.0 {
        metrics.total_return_pct = (last.value / initial_capital - 1.0) * 100.0;
    }

    let days = (last.date - first.date).num_days();
    if days > 0 && initial_capital > 0.0 && last.value > 0.0 {
        let years = days as f64 / DAYS_PER_YEAR;
        metrics.cagr_pct = ((last.value / initial_capital).powf(1.0 / years) - 1.0) * 100.0;
    } else {
        metrics.cagr_pct = metrics.total_return_pct;
    }

    let (drawdown, drawdown_pct) = max_drawdown(equity);
    metrics.max_drawdown = drawdown;
    metrics.max_drawdown_pct = drawdown_pct;

    let returns = daily_returns(equity);
    let rf_daily = risk_free_rate / 100.0 / TRADING_DAYS_PER_YEAR;
    metrics.sharpe = annualized_ratio(&returns, rf_daily, false);
    metrics.sortino = annualized_ratio(&returns, rf_daily, true);

    let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p < 0.0).collect();
    if !trades.is_empty() {
        metrics.win_rate = wins.len() as f64 / trades.len() as f64 * 100.0;
    }
    if !wins.is_empty() {
        metrics.avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
    }
    if !losses.is_empty() {
        metrics.avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
    }
    let gross_win: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum::<f64>().abs();
    metrics.profit_factor = if gross_loss == 0.0 {
        if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gross_win / gross_loss
    };

    metrics
}

/// Peak-to-trough fall over the curve, absolute and as % of the peak.
fn max_drawdown(equity: &[EquityPoint]) -> (f64, f64) {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    let mut worst_pct = 0.0f64;
    for point in equity {
        peak = peak.max(point.value);
        let fall = peak - point.value;
        if fall > worst {
            worst = fall;
            worst_pct = if peak > 0.0 { fall / peak * 100.0 } else { 0.0 };
        }
    }
    (worst, worst_pct)
}

fn daily_returns(equity: &[EquityPoint]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0].value != 0.0)
        .map(|w| w[1].value / w[0].value - 1.0)
        .collect()
}

/// Sharpe (all deviations) or Sortino (downside only), annualized by
/// sqrt(252).
fn annualized_ratio(returns: &[f64], rf_daily: f64, downside_only: bool) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let excess = mean - rf_daily;

    let deviations: Vec<f64> = if downside_only {
        returns.iter().map(|&r| (r - rf_daily).min(0.0)).collect()
    } else {
        returns.iter().map(|&r| r - mean).collect()
    };
    let variance =
        deviations.iter().map(|d| d * d).sum::<f64>() / deviations.len() as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    excess / std * TRADING_DAYS_PER_YEAR.sqrt()
}
