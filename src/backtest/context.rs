//! Per-bar strategy context.
//!
//! The view a strategy gets inside `on_bar`: the current bar, everything up
//! to it, portfolio state, scratch storage that persists across bars, and
//! order placement. Orders queue into the pending book and execute against
//! the next bar's OHLC.

use std::collections::HashMap;

use super::types::{Bar, Order, OrderSide, OrderType, Position};

pub struct StrategyContext<'a> {
    pub(crate) index: usize,
    pub(crate) bars: &'a [Bar],
    pub(crate) position: Position,
    pub(crate) cash: f64,
    pub(crate) scratch: &'a mut HashMap<String, f64>,
    pub(crate) placed: Vec<Order>,
    pub(crate) cancel_pending: bool,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        index: usize,
        bars: &'a [Bar],
        position: Position,
        cash: f64,
        scratch: &'a mut HashMap<String, f64>,
    ) -> Self {
        Self { index, bars, position, cash, scratch, placed: Vec::new(), cancel_pending: false }
    }

    /// Index of the current bar.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The bar being processed.
    pub fn bar(&self) -> &Bar {
        &self.bars[self.index]
    }

    /// All bars up to and including the current one.
    pub fn history(&self) -> &[Bar] {
        &self.bars[..=self.index]
    }

    /// The last `k` bars ending at the current one (shorter near the start).
    pub fn lookback(&self, k: usize) -> &[Bar] {
        let end = self.index + 1;
        &self.bars[end.saturating_sub(k)..end]
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Cash plus position marked at the current close.
    pub fn portfolio_value(&self) -> f64 {
        self.cash + self.position.market_value(self.bar().close)
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.position.unrealized_pnl(self.bar().close)
    }

    /// Scratch storage scoped to the strategy, persisted across bars.
    pub fn scratch(&mut self) -> &mut HashMap<String, f64> {
        self.scratch
    }

    // ------------------------------------------------------------------
    // Order placement. Everything fills against the NEXT bar.
    // ------------------------------------------------------------------

    pub fn buy(&mut self, qty: f64, reason: impl Into<String>) {
        self.place(Order {
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            qty,
            price: None,
            reason: reason.into(),
            placed_at_bar: self.index,
        });
    }

    pub fn buy_limit(&mut self, qty: f64, limit: f64, reason: impl Into<String>) {
        self.place(Order {
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            qty,
            price: Some(limit),
            reason: reason.into(),
            placed_at_bar: self.index,
        });
    }

    pub fn sell(&mut self, qty: f64, reason: impl Into<String>) {
        self.place(Order {
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            qty,
            price: None,
            reason: reason.into(),
            placed_at_bar: self.index,
        });
    }

    pub fn sell_limit(&mut self, qty: f64, limit: f64, reason: impl Into<String>) {
        self.place(Order {
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            qty,
            price: Some(limit),
            reason: reason.into(),
            placed_at_bar: self.index,
        });
    }

    /// Queue any order shape, including stops.
    pub fn place(&mut self, order: Order) {
        if order.qty > 0.0 {
            self.placed.push(order);
        }
    }

    /// Market-sell the whole open position.
    pub fn close_position(&mut self, reason: impl Into<String>) {
        if self.position.qty > 0.0 {
            self.sell(self.position.qty, reason);
        }
    }

    /// Drop every unfilled pending order before the next bar.
    pub fn cancel_pending(&mut self) {
        self.cancel_pending = true;
    }
}
