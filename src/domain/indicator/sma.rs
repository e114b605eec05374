//! Simple Moving Average indicator.
//!
//! SMA(n)[i] = (C[i-n+1] + ... + C[i]) / n, kept as a running window sum.
//! Warmup: first (n-1) bars are unavailable.

use std::collections::VecDeque;

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

/// Rolling mean over an arbitrary input stream. Also drives Stochastic %D.
#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.window.push_back(x);
        self.sum += x;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Sma {
    mean: RollingMean,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            mean: RollingMean::new(period),
        }
    }
}

impl Indicator for Sma {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        self.mean.update(bar.close).and_then(simple)
    }
}

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Sma(period))
}
