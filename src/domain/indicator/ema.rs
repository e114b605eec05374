//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are unavailable.

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

/// SMA-seeded exponential smoothing over an arbitrary input stream.
/// MACD runs three of these.
#[derive(Debug, Clone)]
pub struct ExpSmoother {
    period: usize,
    k: f64,
    seen: usize,
    seed_sum: f64,
    ema: f64,
}

impl ExpSmoother {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            ema: 0.0,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.seen += 1;
        if self.seen < self.period {
            self.seed_sum += x;
            None
        } else if self.seen == self.period {
            self.seed_sum += x;
            self.ema = self.seed_sum / self.period as f64;
            Some(self.ema)
        } else {
            self.ema = x * self.k + self.ema * (1.0 - self.k);
            Some(self.ema)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ema {
    smoother: ExpSmoother,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            smoother: ExpSmoother::new(period),
        }
    }
}

impl Indicator for Ema {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        self.smoother.update(bar.close).and_then(simple)
    }
}

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Ema(period))
}
