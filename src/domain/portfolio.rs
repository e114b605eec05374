//! Portfolio state and equity tracking for a single instrument.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::{Position, Side, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Realized cash, open positions, finished trades and the equity curve of one
/// run. All open positions share a side.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: Vec<Position>,
    pub closed_trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }

    /// Side of the open positions, if any.
    pub fn open_side(&self) -> Option<Side> {
        self.positions.first().map(|p| p.side)
    }

    /// Book a finished trade: its net P&L becomes realized cash.
    pub fn record_trade(&mut self, trade: Trade) {
        self.cash += trade.net_pnl;
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    /// Realized cash plus the mark-to-market of every open position at `price`.
    pub fn total_equity(&self, price: f64, point_value: f64) -> f64 {
        let open: f64 = self
            .positions
            .iter()
            .map(|p| p.mark_to_market(price, point_value))
            .sum();
        self.cash + open
    }
}
