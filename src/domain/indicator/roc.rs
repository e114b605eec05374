//! ROC (Rate of Change) indicator.
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100
//! A zero base close makes the bar unavailable.
//! Warmup: first n bars unavailable.

use std::collections::VecDeque;

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    closes: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            closes: VecDeque::with_capacity(period + 1),
        }
    }
}

impl Indicator for Roc {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        if self.period == 0 {
            return None;
        }
        self.closes.push_back(bar.close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        if self.closes.len() <= self.period {
            return None;
        }
        let base = *self.closes.front()?;
        if base == 0.0 {
            return None;
        }
        simple((bar.close - base) / base * 100.0)
    }
}

pub fn calculate_roc(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Roc(period))
}
