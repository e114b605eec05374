//! Property tests for the metrics calculator.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rulebench::domain::metrics::{profit_factor, Metrics};
use rulebench::domain::portfolio::EquityPoint;

fn curve(values: &[f64]) -> Vec<EquityPoint> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    values
        .iter()
        .enumerate()
        .map(|(i, &equity)| EquityPoint {
            timestamp: start + Duration::days(i as i64),
            equity,
        })
        .collect()
}

proptest! {
    #[test]
    fn profit_factor_is_finite_and_non_negative(
        gross_profit in 0.0f64..1e9,
        gross_loss in 0.0f64..1e9,
    ) {
        let pf = profit_factor(gross_profit, gross_loss);
        prop_assert!(pf.is_finite());
        prop_assert!(pf >= 0.0);
        if gross_loss == 0.0 {
            prop_assert_eq!(pf, gross_profit);
        }
    }

    #[test]
    fn drawdown_is_bounded(values in prop::collection::vec(1.0f64..1e6, 1..200)) {
        let m = Metrics::compute(&[], &curve(&values), values[0], 0.02);
        prop_assert!(m.max_drawdown >= 0.0);
        prop_assert!(m.max_drawdown <= 100.0);
        prop_assert!(m.max_drawdown_amount >= 0.0);
    }

    #[test]
    fn drawdown_zero_iff_non_decreasing(values in prop::collection::vec(1.0f64..1e6, 2..100)) {
        let m = Metrics::compute(&[], &curve(&values), values[0], 0.02);
        let non_decreasing = values.windows(2).all(|w| w[1] >= w[0]);
        prop_assert_eq!(m.max_drawdown == 0.0, non_decreasing);
    }

    #[test]
    fn sorted_curve_has_no_drawdown(mut values in prop::collection::vec(1.0f64..1e6, 2..100)) {
        values.sort_by(f64::total_cmp);
        let m = Metrics::compute(&[], &curve(&values), values[0], 0.02);
        prop_assert_eq!(m.max_drawdown, 0.0);
        prop_assert_eq!(m.max_drawdown_duration, 0);
    }
}

#[test]
fn profit_factor_both_zero_is_zero() {
    assert_eq!(profit_factor(0.0, 0.0), 0.0);
}
