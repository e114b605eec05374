//! OBV (On-Balance Volume) indicator.

use crate::domain::indicator::{
    calculate, simple, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

/// OBV[0] = volume[0]
/// If close[i] > close[i-1]: OBV[i] = OBV[i-1] + volume[i]
/// If close[i] < close[i-1]: OBV[i] = OBV[i-1] - volume[i]
/// If close[i] == close[i-1]: OBV[i] = OBV[i-1]
///
/// No warmup period.
#[derive(Debug, Clone, Default)]
pub struct Obv {
    obv: f64,
    prev_close: Option<f64>,
}

impl Obv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Obv {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        match self.prev_close.replace(bar.close) {
            None => self.obv = bar.volume,
            Some(prev) if bar.close > prev => self.obv += bar.volume,
            Some(prev) if bar.close < prev => self.obv -= bar.volume,
            Some(_) => {}
        }
        simple(self.obv)
    }
}

pub fn calculate_obv(bars: &[Bar]) -> IndicatorSeries {
    calculate(bars, IndicatorType::Obv)
}
