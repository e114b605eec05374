//! Bollinger Bands indicator.
//!
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is population standard deviation (divides by N, not N-1).
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are unavailable.

use crate::domain::indicator::stddev::CloseWindow;
use crate::domain::indicator::{
    calculate, finite, Indicator, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULT_X100: u32 = 200;

#[derive(Debug, Clone)]
pub struct Bollinger {
    window: CloseWindow,
    mult: f64,
}

impl Bollinger {
    pub fn new(period: usize, mult: f64) -> Self {
        Self {
            window: CloseWindow::new(period),
            mult,
        }
    }
}

impl Indicator for Bollinger {
    fn next(&mut self, bar: &Bar) -> Option<IndicatorValue> {
        let (middle, sd) = self.window.push(bar.close)?;
        finite(IndicatorValue::Bollinger {
            upper: middle + self.mult * sd,
            middle,
            lower: middle - self.mult * sd,
        })
    }
}

pub fn calculate_bollinger(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> IndicatorSeries {
    calculate(
        bars,
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::closes;

    #[test]
    fn bands_are_symmetric_around_sma() {
        let bars = closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let series = calculate_bollinger(&bars, 8, 200);
        match series.get(7) {
            Some(IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            }) => {
                assert!((middle - 5.0).abs() < 1e-12);
                assert!((upper - 9.0).abs() < 1e-12);
                assert!((lower - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flat_prices_collapse_bands() {
        let series = calculate_bollinger(&closes(&[10.0; 5]), 3, 250);
        if let Some(IndicatorValue::Bollinger { upper, lower, .. }) = series.get(4) {
            assert!((upper - lower).abs() < f64::EPSILON);
        } else {
            panic!("expected value");
        }
    }

    #[test]
    fn warmup() {
        let bars = closes(&[1.0, 2.0, 3.0]);
        let series = calculate_bollinger(&bars, DEFAULT_PERIOD, DEFAULT_MULT_X100);
        assert!(series.values.iter().all(|p| !p.is_available()));
    }
}
