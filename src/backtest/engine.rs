//! Bar-serial backtest engine.
//!
//! Per bar: execute the pending-order book against this bar's OHLC, run the
//! strategy callback (except on the final bar, where nothing it places could
//! ever fill), record equity. Order failures are recorded as skipped orders
//! and never abort the run. Fully deterministic: no clock, no randomness.

use std::collections::HashMap;

use super::context::StrategyContext;
use super::metrics;
use super::strategy::Strategy;
use super::types::{
    BacktestResult, Bar, EngineConfig, EquityPoint, Order, OrderSide, OrderType, Position,
    SkippedOrder, Trade,
};
use crate::error::BacktestError;

pub struct Backtester {
    config: EngineConfig,
}

impl Backtester {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replay `bars` through `strategy`. Needs at least 2 bars: one to
    /// decide on, one to fill against.
    pub fn run(
        &self,
        strategy: &mut dyn Strategy,
        ticker: &str,
        bars: &[Bar],
    ) -> Result<BacktestResult, BacktestError> {
        if bars.len() < 2 {
            return Err(BacktestError::InsufficientData(bars.len()));
        }

        let mut bars = bars.to_vec();
        bars.sort_by_key(|b| b.timestamp);

        let mut state = SimState {
            cash: self.config.initial_capital,
            position: Position::default(),
            pending: Vec::new(),
            trades: Vec::new(),
            skipped: Vec::new(),
            config: &self.config,
        };
        let mut scratch: HashMap<String, f64> = HashMap::new();
        let mut equity_curve = Vec::with_capacity(bars.len());
        let last_index = bars.len() - 1;

        for (i, bar) in bars.iter().enumerate() {
            state.execute_pending(i, bar);

            // The final bar only settles fills and marks equity.
            if i < last_index {
                let mut ctx =
                    StrategyContext::new(i, &bars, state.position, state.cash, &mut scratch);
                strategy.on_bar(&mut ctx);
                if ctx.cancel_pending {
                    state.pending.clear();
                }
                state.pending.append(&mut ctx.placed);
            }

            equity_curve.push(EquityPoint {
                date: bar.timestamp,
                value: state.cash + state.position.market_value(bar.close),
            });
        }

        // Force-close whatever is still open so metrics see the final
        // round trip.
        let last_bar = bars[last_index];
        if state.position.is_open() {
            state.close_at(last_index, &last_bar, last_bar.close, "backtest_end_close");
            if let Some(point) = equity_curve.last_mut() {
                point.value = state.cash;
            }
        }

        let final_equity = equity_curve.last().map(|p| p.value).unwrap_or(state.cash);
        let computed = metrics::compute(
            &equity_curve,
            &state.trades,
            self.config.initial_capital,
            self.config.risk_free_rate,
        );

        tracing::debug!(
            strategy = strategy.name(),
            ticker,
            trades = state.trades.len(),
            final_equity,
            "backtest complete"
        );

        Ok(BacktestResult {
            strategy: strategy.name().to_string(),
            ticker: ticker.to_string(),
            start: bars[0].timestamp,
            end: last_bar.timestamp,
            initial_capital: self.config.initial_capital,
            final_equity,
            trades: state.trades,
            equity_curve,
            skipped_orders: state.skipped,
            metrics: computed,
        })
    }
}

impl Default for Backtester {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

struct SimState<'a> {
    cash: f64,
    position: Position,
    pending: Vec<Order>,
    trades: Vec<Trade>,
    skipped: Vec<SkippedOrder>,
    config: &'a EngineConfig,
}

impl SimState<'_> {
    /// Try every pending order against this bar; unfilled limit/stop orders
    /// stay in the book.
    fn execute_pending(&mut self, index: usize, bar: &Bar) {
        let orders = std::mem::take(&mut self.pending);
        for order in orders {
            match fill_price(&order, bar, self.config.slippage_pct) {
                Some(px) => self.apply_fill(order, px, index, bar),
                None => self.pending.push(order),
            }
        }
    }

    fn apply_fill(&mut self, order: Order, px: f64, index: usize, bar: &Bar) {
        match order.side {
            OrderSide::Buy => self.apply_buy(order, px, index, bar),
            OrderSide::Sell => self.apply_sell(order, px, index, bar),
        }
    }

    fn apply_buy(&mut self, order: Order, px: f64, index: usize, bar: &Bar) {
        let cost = px * order.qty;
        let commission = cost * self.config.commission_pct / 100.0;
        if cost + commission > self.cash {
            self.skipped.push(SkippedOrder {
                order,
                reason: "insufficient cash".into(),
                bar_index: index,
            });
            return;
        }
        self.cash -= cost + commission;

        // Commission folds into the cost basis so realized PnL nets it out.
        let old_value = self.position.qty * self.position.avg_cost;
        let new_qty = self.position.qty + order.qty;
        self.position.avg_cost = (old_value + cost + commission) / new_qty;
        if !self.position.is_open() {
            self.position.entry_bar = index;
            self.position.entry_date = Some(bar.timestamp);
        }
        self.position.qty = new_qty;
    }

    fn apply_sell(&mut self, order: Order, px: f64, index: usize, bar: &Bar) {
        if !self.position.is_open() {
            self.skipped.push(SkippedOrder {
                order,
                reason: "no open position".into(),
                bar_index: index,
            });
            return;
        }
        // Long-only book: clamp to what is actually held.
        let qty = order.qty.min(self.position.qty);
        self.close_qty(index, bar, px, qty, &order.reason);
    }

    fn close_at(&mut self, index: usize, bar: &Bar, px: f64, reason: &str) {
        let qty = self.position.qty;
        self.close_qty(index, bar, px, qty, reason);
    }

    fn close_qty(&mut self, _index: usize, bar: &Bar, px: f64, qty: f64, reason: &str) {
        let proceeds = px * qty;
        let commission = proceeds * self.config.commission_pct / 100.0;
        self.cash += proceeds - commission;

        let pnl = (px - self.position.avg_cost) * qty - commission;
        self.trades.push(Trade {
            entry_date: self.position.entry_date.unwrap_or(bar.timestamp),
            exit_date: bar.timestamp,
            entry_px: self.position.avg_cost,
            exit_px: px,
            qty,
            pnl,
            reason: reason.to_string(),
        });

        self.position.qty -= qty;
        if !self.position.is_open() {
            self.position = Position::default();
        }
    }
}

/// Fill rules per order type. None means the order stays pending.
fn fill_price(order: &Order, bar: &Bar, slippage_pct: f64) -> Option<f64> {
    match order.order_type {
        OrderType::Market => {
            // Buys pay up, sells pay down.
            let slip = bar.open * slippage_pct / 100.0;
            Some(match order.side {
                OrderSide::Buy => bar.open + slip,
                OrderSide::Sell => bar.open - slip,
            })
        }
        OrderType::Limit => {
            let limit = order.price?;
            match order.side {
                OrderSide::Buy if bar.low <= limit => Some(limit.min(bar.open)),
                OrderSide::Sell if bar.high >= limit => Some(limit.max(bar.open)),
                _ => None,
            }
        }
        OrderType::Stop => {
            let stop = order.price?;
            match order.side {
                OrderSide::Buy if bar.high >= stop => Some(stop),
                OrderSide::Sell if bar.low <= stop => Some(stop),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::strategy::BuyAndHold;
    use chrono::{TimeZone, Utc};

    fn bar_at(day: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::days(day),
            open,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    fn flat_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| bar_at(i as i64, c, c, c, c))
            .collect()
    }

    struct ScriptedOrders {
        orders: Vec<(usize, Order)>,
    }

    impl Strategy for ScriptedOrders {
        fn name(&self) -> &str {
            "scripted"
        }
        fn on_bar(&mut self, ctx: &mut StrategyContext<'_>) {
            let index = ctx.index();
            for (at, order) in &self.orders {
                if *at == index {
                    ctx.place(order.clone());
                }
            }
        }
    }

    fn order(side: OrderSide, order_type: OrderType, qty: f64, price: Option<f64>) -> Order {
        Order { side, order_type, qty, price, reason: "test".into(), placed_at_bar: 0 }
    }

    #[test]
    fn test_insufficient_data() {
        let backtester = Backtester::default();
        let mut strategy = BuyAndHold::qty(1.0);
        let err = backtester.run(&mut strategy, "TCS", &flat_bars(&[100.0])).unwrap_err();
        assert_eq!(err, BacktestError::InsufficientData(1));
    }

    #[test]
    fn test_market_fill_at_next_open() {
        let bars = vec![
            bar_at(0, 100.0, 101.0, 99.0, 100.0),
            bar_at(1, 102.0, 104.0, 101.0, 103.0),
            bar_at(2, 103.0, 105.0, 102.0, 104.0),
        ];
        let config = EngineConfig { initial_capital: 1_000.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Market, 5.0, None))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();

        // Entry at bar 1 open (102), forced close at last close (104).
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_px, 102.0);
        assert_eq!(trade.exit_px, 104.0);
        assert_eq!(trade.pnl, 10.0);
        assert_eq!(result.final_equity, 1010.0);
    }

    #[test]
    fn test_market_slippage_buys_pay_up() {
        let bars = vec![
            bar_at(0, 100.0, 100.0, 100.0, 100.0),
            bar_at(1, 100.0, 100.0, 100.0, 100.0),
            bar_at(2, 100.0, 100.0, 100.0, 100.0),
        ];
        let config = EngineConfig {
            initial_capital: 10_000.0,
            slippage_pct: 1.0,
            ..Default::default()
        };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Market, 10.0, None))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        // Paid 101 per share, forced out at 100.
        assert_eq!(result.trades[0].entry_px, 101.0);
        assert!((result.trades[0].pnl + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_limit_buy_fills_only_when_touched() {
        let bars = vec![
            bar_at(0, 100.0, 101.0, 99.0, 100.0),
            bar_at(1, 100.0, 101.0, 98.5, 100.0), // low 98.5 <= limit 99
            bar_at(2, 100.0, 102.0, 99.5, 101.0),
        ];
        let config = EngineConfig { initial_capital: 10_000.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Limit, 10.0, Some(99.0)))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        assert_eq!(result.trades[0].entry_px, 99.0);

        // Limit never touched: order stays pending, no trades at all.
        let bars = vec![
            bar_at(0, 100.0, 101.0, 99.5, 100.0),
            bar_at(1, 100.0, 101.0, 99.5, 100.0),
            bar_at(2, 100.0, 101.0, 99.5, 100.0),
        ];
        let config = EngineConfig { initial_capital: 10_000.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Limit, 10.0, Some(99.0)))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_limit_buy_gap_down_improves_fill() {
        // Opens below the limit: fill at the better open price.
        let bars = vec![
            bar_at(0, 100.0, 100.0, 100.0, 100.0),
            bar_at(1, 97.0, 99.0, 96.0, 98.0),
            bar_at(2, 98.0, 99.0, 97.0, 98.0),
        ];
        let config = EngineConfig { initial_capital: 10_000.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Limit, 10.0, Some(99.0)))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        assert_eq!(result.trades[0].entry_px, 97.0);
    }

    #[test]
    fn test_stop_sell_triggers_in_range() {
        let bars = vec![
            bar_at(0, 100.0, 100.0, 100.0, 100.0),
            bar_at(1, 100.0, 100.0, 100.0, 100.0), // buy fills here
            bar_at(2, 99.0, 100.0, 94.0, 95.0),    // stop 95 triggers
            bar_at(3, 95.0, 96.0, 94.0, 95.0),
        ];
        let config = EngineConfig { initial_capital: 10_000.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![
                (0, order(OrderSide::Buy, OrderType::Market, 10.0, None)),
                (1, order(OrderSide::Sell, OrderType::Stop, 10.0, Some(95.0))),
            ],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_px, 95.0);
        assert_eq!(result.trades[0].reason, "test");
        assert!((result.trades[0].pnl + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_cash_is_skipped_not_fatal() {
        let bars = flat_bars(&[100.0, 100.0, 100.0]);
        let config = EngineConfig { initial_capital: 500.0, ..Default::default() };
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Buy, OrderType::Market, 10.0, None))],
        };
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.skipped_orders.len(), 1);
        assert_eq!(result.skipped_orders[0].reason, "insufficient cash");
        assert_eq!(result.final_equity, 500.0);
    }

    #[test]
    fn test_sell_without_position_skipped() {
        let bars = flat_bars(&[100.0, 100.0, 100.0]);
        let mut strategy = ScriptedOrders {
            orders: vec![(0, order(OrderSide::Sell, OrderType::Market, 10.0, None))],
        };
        let result = Backtester::default().run(&mut strategy, "TCS", &bars).unwrap();
        assert_eq!(result.skipped_orders[0].reason, "no open position");
    }

    #[test]
    fn test_two_bars_single_callback_and_forced_close() {
        let bars = flat_bars(&[100.0, 101.0]);
        let config = EngineConfig { initial_capital: 1_000.0, ..Default::default() };
        let mut strategy = BuyAndHold::qty(1.0);
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();
        // Order from bar 0 fills at bar 1, then is force-closed there.
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].reason, "backtest_end_close");
        assert_eq!(result.equity_curve.len(), 2);
    }

    #[test]
    fn test_buy_and_hold_uptrend() {
        // close[i] = 100 * 1.005^i over 20 bars.
        let closes: Vec<f64> = (0..20).map(|i| 100.0 * 1.005f64.powi(i)).collect();
        let bars = flat_bars(&closes);
        let config = EngineConfig { initial_capital: 1_000.0, ..Default::default() };
        let mut strategy = BuyAndHold::qty(1.0);
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();

        assert!(result.final_equity >= result.initial_capital);
        assert_eq!(result.trades.len(), 1);
        assert!(result.trades[0].pnl > 0.0);
        assert_eq!(result.trades[0].reason, "backtest_end_close");
        assert_eq!(result.metrics.max_drawdown, 0.0);
        assert_eq!(result.metrics.win_rate, 100.0);
    }

    #[test]
    fn test_determinism_field_by_field() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 10.0)
            .collect();
        let bars = flat_bars(&closes);
        let config = EngineConfig {
            initial_capital: 10_000.0,
            slippage_pct: 0.1,
            commission_pct: 0.05,
            ..Default::default()
        };

        let run = || {
            let mut strategy = crate::backtest::strategy::RsiReversion::new(7, 35.0, 65.0, 10.0);
            Backtester::new(config.clone()).run(&mut strategy, "TCS", &bars).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsorted_bars_are_sorted() {
        let mut bars = flat_bars(&[100.0, 101.0, 102.0]);
        bars.swap(0, 2);
        let result = Backtester::default()
            .run(&mut BuyAndHold::qty(1.0), "TCS", &bars)
            .unwrap();
        assert!(result.start < result.end);
        assert_eq!(result.equity_curve[0].value, result.initial_capital);
    }

    #[test]
    fn test_equity_accounting_invariant() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let bars = flat_bars(&closes);
        let config = EngineConfig { initial_capital: 1_000.0, ..Default::default() };
        let mut strategy = BuyAndHold::qty(2.0);
        let result = Backtester::new(config).run(&mut strategy, "TCS", &bars).unwrap();

        // Until the forced close, equity = cash + qty * close. After entry
        // at bar 1 (open 101): cash = 1000 - 202.
        for (i, point) in result.equity_curve.iter().enumerate().skip(1).take(13) {
            let expected = (1000.0 - 202.0) + 2.0 * closes[i];
            assert!((point.value - expected).abs() < 1e-9, "bar {i}");
        }
        // Round trip: pnl = (exit - entry) * qty with zero costs.
        let trade = &result.trades[0];
        assert!((trade.pnl - (trade.exit_px - trade.entry_px) * trade.qty).abs() < 1e-9);
    }
}
