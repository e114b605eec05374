//! Parallel batch runs over a shared bar slice.

use std::sync::atomic::AtomicBool;

use chrono::NaiveDateTime;
use rayon::prelude::*;

use super::backtest::{run_backtest, BacktestConfig, BacktestResult};
use super::error::BacktestError;
use super::ohlcv::Bar;
use super::strategy::CompiledStrategy;

/// One independent run: a strategy, its configuration and an optional
/// inclusive timestamp range.
#[derive(Debug, Clone)]
pub struct BacktestJob {
    pub label: String,
    pub strategy: CompiledStrategy,
    pub config: BacktestConfig,
    pub range: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl BacktestJob {
    pub fn new(
        label: impl Into<String>,
        strategy: CompiledStrategy,
        config: BacktestConfig,
    ) -> Self {
        BacktestJob {
            label: label.into(),
            strategy,
            config,
            range: None,
        }
    }

    pub fn with_range(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.range = Some((start, end));
        self
    }
}

/// Bars with `start <= timestamp <= end`. Assumes `bars` is sorted; unsorted
/// input is rejected later by the run itself.
pub fn slice_range(bars: &[Bar], start: NaiveDateTime, end: NaiveDateTime) -> &[Bar] {
    let lo = bars.partition_point(|b| b.timestamp < start);
    let hi = bars.partition_point(|b| b.timestamp <= end);
    if lo >= hi { &[] } else { &bars[lo..hi] }
}

/// Run every job in parallel. Results come back in job order.
pub fn run_batch(
    bars: &[Bar],
    jobs: &[BacktestJob],
    cancel: Option<&AtomicBool>,
) -> Vec<Result<BacktestResult, BacktestError>> {
    tracing::info!(jobs = jobs.len(), bars = bars.len(), "starting batch");

    jobs.par_iter()
        .map(|job| {
            let slice = match job.range {
                Some((start, end)) => slice_range(bars, start, end),
                None => bars,
            };
            let result = run_backtest(slice, &job.strategy, &job.config, cancel);
            if let Err(e) = &result {
                tracing::warn!(job = %job.label, error = %e, "batch job failed");
            }
            result
        })
        .collect()
}
