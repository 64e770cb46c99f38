//! Strategy trait and reference strategies.

use super::context::StrategyContext;
use crate::ta;

/// A bar-serial trading strategy. `on_bar` runs once per bar after pending
/// orders execute; any orders it places fill against the next bar.
pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>);
}

/// Buys once at the first bar with everything it can afford, then holds.
pub struct BuyAndHold {
    qty: Option<f64>,
}

impl BuyAndHold {
    /// Hold a fixed quantity.
    pub fn qty(qty: f64) -> Self {
        Self { qty: Some(qty) }
    }

    /// Invest all available capital at the first bar.
    pub fn all_in() -> Self {
        Self { qty: None }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) {
        if ctx.index() == 0 {
            let qty = match self.qty {
                Some(qty) => qty,
                None => (ctx.cash() / ctx.bar().close).floor(),
            };
            if qty > 0.0 {
                ctx.buy(qty, "initial entry");
            }
        }
    }
}

/// Classic fast/slow SMA crossover: long on golden cross, flat on death
/// cross.
pub struct SmaCrossover {
    pub fast: usize,
    pub slow: usize,
    pub qty: f64,
}

impl SmaCrossover {
    pub fn new(fast: usize, slow: usize, qty: f64) -> Self {
        Self { fast, slow, qty }
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) {
        let closes: Vec<f64> = ctx.history().iter().map(|b| b.close).collect();
        if closes.len() < self.slow + 1 {
            return;
        }
        let fast = ta::sma(&closes, self.fast);
        let slow = ta::sma(&closes, self.slow);

        let flat = !ctx.position().is_open();
        if flat && ta::crossover(&fast, &slow) {
            ctx.buy(self.qty, "golden cross");
        } else if !flat && ta::crossunder(&fast, &slow) {
            ctx.close_position("death cross");
        }
    }
}

/// Mean reversion on RSI extremes: buy oversold, exit overbought.
pub struct RsiReversion {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub qty: f64,
}

impl RsiReversion {
    pub fn new(period: usize, oversold: f64, overbought: f64, qty: f64) -> Self {
        Self { period, oversold, overbought, qty }
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) {
        let closes: Vec<f64> = ctx.history().iter().map(|b| b.close).collect();
        let Some(&rsi) = ta::rsi(&closes, self.period).last() else {
            return;
        };
        let flat = !ctx.position().is_open();
        if flat && rsi <= self.oversold {
            ctx.buy(self.qty, format!("rsi oversold at {rsi:.1}"));
        } else if !flat && rsi >= self.overbought {
            ctx.close_position(format!("rsi overbought at {rsi:.1}"));
        }
    }
}
