//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `Indicator`: streaming state machine, one bar in, one optional value out
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! A value of `None` means "not available": still warming up, or the formula
//! hit a zero divisor or produced a non-finite number. Unavailable is never
//! encoded as a default number.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod stochastic;
pub mod vwap;
pub mod wma;

pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use obv::calculate_obv;
pub use roc::calculate_roc;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stddev::calculate_stddev;
pub use stochastic::calculate_stochastic;
pub use vwap::calculate_vwap;
pub use wma::calculate_wma;

use crate::domain::ohlcv::Bar;
use chrono::NaiveDateTime;
use std::fmt;

/// Incremental indicator: given its previous state and one new bar, produce
/// the value for that bar without revisiting history.
pub trait Indicator: Send {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub value: Option<IndicatorValue>,
}

impl IndicatorPoint {
    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

impl IndicatorValue {
    fn is_finite(&self) -> bool {
        match *self {
            IndicatorValue::Simple(v) => v.is_finite(),
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => line.is_finite() && signal.is_finite() && histogram.is_finite(),
            IndicatorValue::Stochastic { k, d } => k.is_finite() && d.is_finite(),
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => upper.is_finite() && middle.is_finite() && lower.is_finite(),
        }
    }
}

/// Drop any value that is not finite so that NaN/inf never reach the evaluator.
pub(crate) fn finite(value: IndicatorValue) -> Option<IndicatorValue> {
    value.is_finite().then_some(value)
}

/// `Simple` wrapper that also filters out non-finite numbers.
pub(crate) fn simple(v: f64) -> Option<IndicatorValue> {
    finite(IndicatorValue::Simple(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Wma(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Stddev(usize),
    Obv,
    /// Cumulative VWAP when `None`, rolling over N bars otherwise.
    Vwap(Option<usize>),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl IndicatorType {
    /// Fresh streaming state for this indicator.
    pub fn build(&self) -> Box<dyn Indicator> {
        match *self {
            IndicatorType::Sma(period) => Box::new(sma::Sma::new(period)),
            IndicatorType::Ema(period) => Box::new(ema::Ema::new(period)),
            IndicatorType::Wma(period) => Box::new(wma::Wma::new(period)),
            IndicatorType::Rsi(period) => Box::new(rsi::Rsi::new(period)),
            IndicatorType::Roc(period) => Box::new(roc::Roc::new(period)),
            IndicatorType::Atr(period) => Box::new(atr::Atr::new(period)),
            IndicatorType::Stddev(period) => Box::new(stddev::Stddev::new(period)),
            IndicatorType::Obv => Box::new(obv::Obv::new()),
            IndicatorType::Vwap(window) => Box::new(vwap::Vwap::new(window)),
            IndicatorType::Macd { fast, slow, signal } => {
                Box::new(macd::Macd::new(fast, slow, signal))
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                Box::new(stochastic::Stochastic::new(k_period, d_period))
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => Box::new(bollinger::Bollinger::new(
                period,
                stddev_mult_x100 as f64 / 100.0,
            )),
        }
    }

    /// Index of the first bar that can carry a value.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorType::Sma(n)
            | IndicatorType::Ema(n)
            | IndicatorType::Wma(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Stddev(n)
            | IndicatorType::Bollinger { period: n, .. } => n.saturating_sub(1),
            IndicatorType::Rsi(n) | IndicatorType::Roc(n) => n,
            IndicatorType::Obv | IndicatorType::Vwap(None) => 0,
            IndicatorType::Vwap(Some(n)) => n.saturating_sub(1),
            IndicatorType::Macd { fast, slow, signal } => {
                fast.max(slow).saturating_sub(1) + signal.saturating_sub(1)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                k_period.saturating_sub(1) + d_period.saturating_sub(1)
            }
        }
    }
}

/// Run a fresh state for `indicator_type` over every bar.
pub fn calculate(bars: &[Bar], indicator_type: IndicatorType) -> IndicatorSeries {
    let mut state = indicator_type.build();
    let values = bars
        .iter()
        .map(|bar| IndicatorPoint {
            timestamp: bar.timestamp,
            value: state.next(bar),
        })
        .collect();
    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn get(&self, index: usize) -> Option<IndicatorValue> {
        self.values.get(index).and_then(|p| p.value)
    }

    /// The `Simple` value at `index`, if available.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.get(index) {
            Some(IndicatorValue::Simple(v)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Wma(period) => write!(f, "WMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Vwap(None) => write!(f, "VWAP"),
            IndicatorType::Vwap(Some(window)) => write!(f, "VWAP({})", window),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}
