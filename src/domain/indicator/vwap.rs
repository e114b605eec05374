//! Volume Weighted Average Price.
//!
//! VWAP = sum(typical_price * volume) / sum(volume), either cumulative from
//! the first bar or over a rolling window of n bars. Zero total volume makes
//! the bar unavailable.

use std::collections::VecDeque;

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone)]
pub struct Vwap {
    window: Option<usize>,
    entries: VecDeque<(f64, f64)>,
    pv_sum: f64,
    volume_sum: f64,
}

impl Vwap {
    pub fn new(window: Option<usize>) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
            pv_sum: 0.0,
            volume_sum: 0.0,
        }
    }
}

impl Indicator for Vwap {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        let pv = bar.typical_price() * bar.volume;
        self.pv_sum += pv;
        self.volume_sum += bar.volume;

        if let Some(n) = self.window {
            if n == 0 {
                return None;
            }
            self.entries.push_back((pv, bar.volume));
            if self.entries.len() > n {
                if let Some((old_pv, old_volume)) = self.entries.pop_front() {
                    self.pv_sum -= old_pv;
                    self.volume_sum -= old_volume;
                }
            }
            if self.entries.len() < n {
                return None;
            }
        }

        if self.volume_sum <= 0.0 {
            return None;
        }
        simple(self.pv_sum / self.volume_sum)
    }
}

pub fn calculate_vwap(bars: &[Bar], window: Option<usize>) -> IndicatorSeries {
    calculate(bars, IndicatorType::Vwap(window))
}
