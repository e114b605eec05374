//! Open positions and the trades they turn into.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::risk::ExitLevels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn direction(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SignalClose,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub size: f64,
    /// Market price at entry, before slippage.
    pub entry_price: f64,
    pub entry_timestamp: NaiveDateTime,
    pub entry_index: usize,
    pub levels: ExitLevels,
    pub atr_at_entry: Option<f64>,
    pub entry_commission: f64,
    pub entry_slippage: f64,
    pub rule: String,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    /// Gross P&L at `price`, scaled by the instrument point value.
    pub fn unrealized_pnl(&self, price: f64, point_value: f64) -> f64 {
        self.side.direction() * (price - self.entry_price) * self.size * point_value
    }

    /// Unrealized P&L less the costs already paid to open the position.
    pub fn mark_to_market(&self, price: f64, point_value: f64) -> f64 {
        self.unrealized_pnl(price, point_value) - self.entry_commission - self.entry_slippage
    }
}

/// A completed round trip. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub size: f64,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub entry_index: usize,
    pub exit_timestamp: NaiveDateTime,
    pub exit_price: f64,
    pub exit_index: usize,
    pub exit_reason: ExitReason,
    pub gross_pnl: f64,
    pub commission: f64,
    pub slippage: f64,
    pub net_pnl: f64,
    pub rule: String,
}

impl Trade {
    pub fn duration(&self) -> Duration {
        self.exit_timestamp - self.entry_timestamp
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.net_pnl < 0.0
    }
}
