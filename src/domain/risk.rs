//! Stop-loss / take-profit resolution and intrabar exit checks.
//!
//! A `RiskSpec` is a distance description (`percentage`, `points`, `ticks`,
//! `atr`). At entry it resolves to an absolute price delta, which becomes the
//! stop below (long) or above (short) the entry price and the target on the
//! other side.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{ExitReason, Side};

pub const DEFAULT_ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    Percentage,
    Points,
    Ticks,
    Atr,
}

impl FromStr for RiskKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" | "pct" => Ok(RiskKind::Percentage),
            "points" => Ok(RiskKind::Points),
            "ticks" => Ok(RiskKind::Ticks),
            "atr" => Ok(RiskKind::Atr),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskKind::Percentage => "percentage",
            RiskKind::Points => "points",
            RiskKind::Ticks => "ticks",
            RiskKind::Atr => "atr",
        };
        f.write_str(s)
    }
}

/// A validated risk distance. Ticks specs carry the instrument tick size they
/// were validated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSpec {
    pub kind: RiskKind,
    pub value: f64,
    tick_size: Option<f64>,
}

impl RiskSpec {
    /// Validate a raw `(type, value)` pair. `context` names the owning rule or
    /// strategy default in the error.
    pub fn new(
        kind: &str,
        value: f64,
        tick_size: Option<f64>,
        context: &str,
    ) -> Result<Self, ConfigError> {
        let kind: RiskKind = kind.parse().map_err(|_| ConfigError::UnknownRiskType {
            context: context.to_string(),
            kind: kind.to_string(),
        })?;
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::MalformedRiskValue {
                context: context.to_string(),
                value: value.to_string(),
            });
        }
        let tick_size = match kind {
            RiskKind::Ticks => match tick_size {
                Some(t) if t.is_finite() && t > 0.0 => Some(t),
                _ => {
                    return Err(ConfigError::MissingTickSize {
                        context: context.to_string(),
                    });
                }
            },
            _ => None,
        };
        Ok(Self {
            kind,
            value,
            tick_size,
        })
    }

    pub fn needs_atr(&self) -> bool {
        self.kind == RiskKind::Atr
    }

    /// Absolute price distance from the entry price, or `None` when an ATR
    /// spec has no ATR reading.
    pub fn price_delta(&self, entry_price: f64, atr_at_entry: Option<f64>) -> Option<f64> {
        let delta = match self.kind {
            RiskKind::Percentage => entry_price * self.value / 100.0,
            RiskKind::Points => self.value,
            RiskKind::Ticks => self.value * self.tick_size?,
            RiskKind::Atr => self.value * atr_at_entry?,
        };
        delta.is_finite().then_some(delta)
    }
}

/// Which exit wins when one bar reaches both levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    StopLossFirst,
    TakeProfitFirst,
}

impl FromStr for TieBreak {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop_loss_first" | "stop_loss" => Ok(TieBreak::StopLossFirst),
            "take_profit_first" | "take_profit" => Ok(TieBreak::TakeProfitFirst),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Resolve absolute levels for a position entered at `entry_price`.
///
/// Returns `None` if any supplied spec cannot be resolved, which for an ATR
/// spec means the ATR is still warming up.
pub fn resolve_levels(
    side: Side,
    entry_price: f64,
    stop_loss: Option<&RiskSpec>,
    take_profit: Option<&RiskSpec>,
    atr_at_entry: Option<f64>,
) -> Option<ExitLevels> {
    let direction = side.direction();
    let stop_loss = match stop_loss {
        Some(spec) => Some(entry_price - direction * spec.price_delta(entry_price, atr_at_entry)?),
        None => None,
    };
    let take_profit = match take_profit {
        Some(spec) => Some(entry_price + direction * spec.price_delta(entry_price, atr_at_entry)?),
        None => None,
    };
    Some(ExitLevels {
        stop_loss,
        take_profit,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub reason: ExitReason,
    pub price: f64,
}

/// Check whether this bar's range reaches either level. The exit price is the
/// level itself.
pub fn check_exit(
    side: Side,
    levels: &ExitLevels,
    bar: &Bar,
    tie_break: TieBreak,
) -> Option<ExitTrigger> {
    let stop_hit = levels.stop_loss.filter(|&stop| match side {
        Side::Long => bar.low <= stop,
        Side::Short => bar.high >= stop,
    });
    let target_hit = levels.take_profit.filter(|&target| match side {
        Side::Long => bar.high >= target,
        Side::Short => bar.low <= target,
    });

    let stop = stop_hit.map(|price| ExitTrigger {
        reason: ExitReason::StopLoss,
        price,
    });
    let target = target_hit.map(|price| ExitTrigger {
        reason: ExitReason::TakeProfit,
        price,
    });

    match tie_break {
        TieBreak::StopLossFirst => stop.or(target),
        TieBreak::TakeProfitFirst => target.or(stop),
    }
}
