//! Stochastic oscillator.
//!
//! %K = (C - lowest_low(k)) / (highest_high(k) - lowest_low(k)) * 100
//! %D = SMA(d) of %K
//!
//! A flat k-window (zero range) leaves %K undefined for that bar, which also
//! holds back %D. The value is available once both lines exist.
//! Default parameters: k=14, d=3.
//!
//! The k-window extremes come from monotonic deques, so each bar is O(1)
//! amortized.

use std::collections::VecDeque;

use crate::domain::indicator::sma::RollingMean;
use crate::domain::indicator::{
    calculate, finite, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_K: usize = 14;
pub const DEFAULT_D: usize = 3;

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    seen: usize,
    /// `(bar, high)` with strictly decreasing highs; the front is the max.
    highs: VecDeque<(usize, f64)>,
    /// `(bar, low)` with strictly increasing lows; the front is the min.
    lows: VecDeque<(usize, f64)>,
    d_line: RollingMean,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        Self {
            k_period,
            seen: 0,
            highs: VecDeque::with_capacity(k_period),
            lows: VecDeque::with_capacity(k_period),
            d_line: RollingMean::new(d_period),
        }
    }

    fn percent_k(&mut self, bar: &Bar) -> Option<f64> {
        if self.k_period == 0 {
            return None;
        }
        let index = self.seen;
        self.seen += 1;

        while self.highs.back().is_some_and(|&(_, h)| h <= bar.high) {
            self.highs.pop_back();
        }
        self.highs.push_back((index, bar.high));
        while self.lows.back().is_some_and(|&(_, l)| l >= bar.low) {
            self.lows.pop_back();
        }
        self.lows.push_back((index, bar.low));

        let k_period = self.k_period;
        let expired = |&(i, _): &(usize, f64)| i + k_period <= index;
        while self.highs.front().is_some_and(expired) {
            self.highs.pop_front();
        }
        while self.lows.front().is_some_and(expired) {
            self.lows.pop_front();
        }

        if self.seen < self.k_period {
            return None;
        }
        let highest = self.highs.front()?.1;
        let lowest = self.lows.front()?.1;
        let range = highest - lowest;
        if range <= 0.0 {
            return None;
        }
        Some((bar.close - lowest) / range * 100.0)
    }
}

impl Indicator for Stochastic {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        let k = self.percent_k(bar)?;
        let d = self.d_line.update(k)?;
        finite(IndicatorValue::Stochastic { k, d })
    }
}

pub fn calculate_stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Stochastic { k_period, d_period })
}
