//! Weighted Moving Average indicator.
//!
//! WMA(n) = (1*P[i-n+1] + 2*P[i-n+2] + ... + n*P[i]) / (n*(n+1)/2)
//! Once the window is full the weighted sum slides in O(1):
//! weighted += n*P[i] - window_sum, then window_sum += P[i] - P[i-n].
//! Warmup: first (n-1) bars are unavailable.

use std::collections::VecDeque;

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    divisor: f64,
    window: VecDeque<f64>,
    weighted_sum: f64,
    window_sum: f64,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            divisor: (period * (period + 1)) as f64 / 2.0,
            window: VecDeque::with_capacity(period),
            weighted_sum: 0.0,
            window_sum: 0.0,
        }
    }
}

impl Indicator for Wma {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        if self.period == 0 {
            return None;
        }
        let price = bar.close;
        if self.window.len() < self.period {
            let weight = (self.window.len() + 1) as f64;
            self.weighted_sum += weight * price;
            self.window_sum += price;
        } else {
            let oldest = self.window.pop_front().unwrap_or(0.0);
            self.weighted_sum += self.period as f64 * price - self.window_sum;
            self.window_sum += price - oldest;
        }
        self.window.push_back(price);

        if self.window.len() == self.period {
            simple(self.weighted_sum / self.divisor)
        } else {
            None
        }
    }
}

pub fn calculate_wma(bars: &[Bar], period: usize) -> IndicatorSeries {
    calculate(bars, IndicatorType::Wma(period))
}
