//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line, seeded once the line exists
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: max(fast, slow) - 1 + signal - 1 bars.

use crate::domain::indicator::ema::ExpSmoother;
use crate::domain::indicator::{
    calculate, finite, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone)]
pub struct Macd {
    fast: ExpSmoother,
    slow: ExpSmoother,
    signal: ExpSmoother,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: ExpSmoother::new(fast),
            slow: ExpSmoother::new(slow),
            signal: ExpSmoother::new(signal),
        }
    }
}

impl Indicator for Macd {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        // both EMAs must see every bar, so update before matching
        let fast = self.fast.update(bar.close);
        let slow = self.slow.update(bar.close);
        let line = fast? - slow?;
        let signal = self.signal.update(line)?;
        finite(IndicatorValue::Macd {
            line,
            signal,
            histogram: line - signal,
        })
    }
}

pub fn calculate_macd(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Macd { fast, slow, signal })
}

pub fn calculate_macd_default(bars: &[Bar]) -> IndicatorSeries {
    calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
