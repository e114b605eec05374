//! Standard Deviation indicator.
//!
//! Population standard deviation over n closing prices, kept incrementally.
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n-1) / n)
//! Warmup: first (n-1) bars are unavailable.

use std::collections::VecDeque;

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

/// Fixed-size window of closes with mean and population deviation, updated
/// in O(1) per value (sliding Welford). Bollinger Bands reuse it.
#[derive(Debug, Clone)]
pub struct CloseWindow {
    period: usize,
    values: VecDeque<f64>,
    mean: f64,
    /// Sum of squared deviations from `mean`.
    m2: f64,
}

impl CloseWindow {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Push a value and return `(mean, stddev)` once the window is full.
    pub fn push(&mut self, x: f64) -> Option<(f64, f64)> {
        if self.period == 0 {
            return None;
        }
        let n = self.period as f64;
        if self.values.len() == self.period {
            let old = self.values.pop_front()?;
            let mean = self.mean + (x - old) / n;
            self.m2 += (x - old) * (x - mean + old - self.mean);
            self.mean = mean;
        } else {
            let count = (self.values.len() + 1) as f64;
            let delta = x - self.mean;
            self.mean += delta / count;
            self.m2 += delta * (x - self.mean);
        }
        self.values.push_back(x);
        if !(self.mean.is_finite() && self.m2.is_finite()) {
            self.rebuild();
        }
        if self.values.len() < self.period {
            return None;
        }
        let variance = (self.m2 / n).max(0.0);
        Some((self.mean, variance.sqrt()))
    }

    /// Recompute from the stored values. Only needed while a non-finite
    /// value sits in the window.
    fn rebuild(&mut self) {
        self.mean = 0.0;
        self.m2 = 0.0;
        for (i, x) in self.values.iter().enumerate() {
            let delta = x - self.mean;
            self.mean += delta / (i + 1) as f64;
            self.m2 += delta * (x - self.mean);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stddev {
    window: CloseWindow,
}

impl Stddev {
    pub fn new(period: usize) -> Self {
        Self {
            window: CloseWindow::new(period),
        }
    }
}

impl Indicator for Stddev {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        self.window.push(bar.close).and_then(|(_, sd)| simple(sd))
    }
}

pub fn calculate_stddev(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Stddev(period))
}
