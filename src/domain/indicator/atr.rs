//! Average True Range indicator.
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! Seed is the mean of the first n TRs, then Wilder smoothing:
//! ATR[i] = (ATR[i-1]*(n-1) + TR[i]) / n.
//! Warmup: first (n-1) bars are unavailable.

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seen: usize,
    atr: f64,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            seen: 0,
            atr: 0.0,
        }
    }
}

impl Indicator for Atr {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        let tr = match self.prev_close.replace(bar.close) {
            Some(prev) => bar.true_range(prev),
            None => bar.high - bar.low,
        };
        if self.period == 0 {
            return None;
        }
        self.seen += 1;
        let n = self.period as f64;

        if self.seen < self.period {
            self.atr += tr;
            None
        } else if self.seen == self.period {
            self.atr = (self.atr + tr) / n;
            simple(self.atr)
        } else {
            self.atr = (self.atr * (n - 1.0) + tr) / n;
            simple(self.atr)
        }
    }
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Atr(period))
}
