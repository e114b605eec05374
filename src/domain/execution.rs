//! Trade execution and fill simulation.
//!
//! Positions open and close at a market price; slippage worsens the fill in
//! the trade's disfavor and commission is charged on each side. Gross P&L is
//! measured on market prices, costs are reported separately and subtracted
//! for net P&L.

use chrono::NaiveDateTime;

use super::position::{ExitReason, Position, Side, Trade};
use super::risk::ExitLevels;

/// Configuration for fill costs and contract scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub point_value: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            point_value: 1.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Entry fill: long pays up, short sells down.
pub fn entry_fill(side: Side, market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + side.direction() * slippage_pct / 100.0)
}

/// Exit fill: long sells down, short covers up.
pub fn exit_fill(side: Side, market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - side.direction() * slippage_pct / 100.0)
}

/// Everything decided about an entry before it is filled.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub side: Side,
    pub size: f64,
    pub levels: ExitLevels,
    pub atr_at_entry: Option<f64>,
    pub rule: String,
}

/// Fill an entry order at `market_price`.
pub fn open_position(
    order: EntryOrder,
    market_price: f64,
    timestamp: NaiveDateTime,
    index: usize,
    config: &ExecutionConfig,
) -> Position {
    let fill = entry_fill(order.side, market_price, config.slippage_pct);
    let units = order.size * config.point_value;
    Position {
        side: order.side,
        size: order.size,
        entry_price: market_price,
        entry_timestamp: timestamp,
        entry_index: index,
        levels: order.levels,
        atr_at_entry: order.atr_at_entry,
        entry_commission: calculate_commission(fill.abs() * units, config),
        entry_slippage: (fill - market_price).abs() * units,
        rule: order.rule,
    }
}

/// Close `position` at `market_price` and produce the finished trade.
pub fn close_position(
    position: Position,
    market_price: f64,
    timestamp: NaiveDateTime,
    index: usize,
    reason: ExitReason,
    config: &ExecutionConfig,
) -> Trade {
    let fill = exit_fill(position.side, market_price, config.slippage_pct);
    let units = position.size * config.point_value;
    let exit_commission = calculate_commission(fill.abs() * units, config);
    let exit_slippage = (fill - market_price).abs() * units;

    let gross_pnl = position.unrealized_pnl(market_price, config.point_value);
    let commission = position.entry_commission + exit_commission;
    let slippage = position.entry_slippage + exit_slippage;

    Trade {
        side: position.side,
        size: position.size,
        entry_timestamp: position.entry_timestamp,
        entry_price: position.entry_price,
        entry_index: position.entry_index,
        exit_timestamp: timestamp,
        exit_price: market_price,
        exit_index: index,
        exit_reason: reason,
        gross_pnl,
        commission,
        slippage,
        net_pnl: gross_pnl - commission - slippage,
        rule: position.rule,
    }
}
