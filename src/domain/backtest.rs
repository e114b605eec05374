//! Backtest engine and event loop.
//!
//! One pass over the bars. For each bar the loop validates it, advances the
//! indicator arena, applies stop/target exits to positions from earlier bars
//! and, if nothing closed, asks the rule evaluator what to do. Open positions
//! are force-closed at the last processed bar's close.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::error::{BacktestError, DataIntegrityError};
use super::execution::{close_position, open_position, EntryOrder, ExecutionConfig};
use super::indicator::IndicatorType;
use super::metrics::Metrics;
use super::ohlcv::Bar;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ExitReason, Position, Trade};
use super::risk::{check_exit, resolve_levels, RiskSpec, TieBreak, DEFAULT_ATR_PERIOD};
use super::rule_eval::{decide, Decision, PositionState};
use super::snapshot::{IndicatorArena, IndicatorSnapshot};
use super::strategy::CompiledStrategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub point_value: f64,
    pub tick_size: Option<f64>,
    pub atr_period: usize,
    pub tie_break: TieBreak,
    /// Number of recent closes the price sanity median is taken over.
    pub sanity_window: usize,
    pub sanity_factor: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            point_value: 1.0,
            tick_size: None,
            atr_period: DEFAULT_ATR_PERIOD,
            tie_break: TieBreak::default(),
            sanity_window: 50,
            sanity_factor: 10.0,
            risk_free_rate: 0.02,
        }
    }
}

impl BacktestConfig {
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: self.commission_per_trade,
            commission_pct: self.commission_pct,
            slippage_pct: self.slippage_pct,
            point_value: self.point_value,
        }
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        let invalid = |reason: String| Err(BacktestError::InvalidConfig { reason });

        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            ));
        }
        for (name, value) in [
            ("commission_per_trade", self.commission_per_trade),
            ("commission_pct", self.commission_pct),
            ("slippage_pct", self.slippage_pct),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{} must be non-negative, got {}", name, value));
            }
        }
        if !(self.point_value.is_finite() && self.point_value > 0.0) {
            return invalid(format!(
                "point_value must be positive, got {}",
                self.point_value
            ));
        }
        if let Some(tick) = self.tick_size {
            if !(tick.is_finite() && tick > 0.0) {
                return invalid(format!("tick_size must be positive, got {}", tick));
            }
        }
        if self.atr_period == 0 {
            return invalid("atr_period must be at least 1".to_string());
        }
        if self.sanity_window == 0 {
            return invalid("sanity_window must be at least 1".to_string());
        }
        if !(self.sanity_factor.is_finite() && self.sanity_factor > 1.0) {
            return invalid(format!(
                "sanity_factor must be greater than 1, got {}",
                self.sanity_factor
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return invalid("risk_free_rate must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub status: RunStatus,
    pub bars_processed: usize,
    pub total_bars: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    /// Human-readable verdict on the run.
    pub summary: String,
    pub config_issues: Vec<String>,
}

/// Run `strategy` over `bars`.
///
/// `cancel` is polled once per bar; when it is set the run stops and returns
/// a result with [`RunStatus::Cancelled`].
pub fn run_backtest(
    bars: &[Bar],
    strategy: &CompiledStrategy,
    config: &BacktestConfig,
    cancel: Option<&AtomicBool>,
) -> Result<BacktestResult, BacktestError> {
    simulate(bars, strategy, config, |_| {
        cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    })
}

/// The bar loop behind [`run_backtest`]. `should_stop` is asked before each
/// bar index is processed.
fn simulate(
    bars: &[Bar],
    strategy: &CompiledStrategy,
    config: &BacktestConfig,
    should_stop: impl Fn(usize) -> bool,
) -> Result<BacktestResult, BacktestError> {
    config.validate()?;
    if bars.is_empty() {
        return Err(BacktestError::NoBars);
    }

    tracing::info!(
        strategy = %strategy.name,
        symbol = %strategy.symbol,
        bars = bars.len(),
        "starting backtest"
    );

    let mut sim = Simulation {
        config,
        exec: config.execution_config(),
        atr_type: IndicatorType::Atr(config.atr_period),
        portfolio: Portfolio::new(config.initial_capital),
    };
    let mut arena = IndicatorArena::new(strategy.indicator_types(config.atr_period));
    let mut status = RunStatus::Completed;
    let mut processed = 0usize;

    for (index, bar) in bars.iter().enumerate() {
        if should_stop(index) {
            status = RunStatus::Cancelled;
            break;
        }

        validate_bar(bars, index)?;
        arena.push(bar);
        let history = &bars[..=index];
        let Some(snapshot) = IndicatorSnapshot::new(history, &arena) else {
            continue;
        };
        processed = index + 1;

        let closed_any = sim.apply_risk_exits(history)?;
        if !closed_any {
            let state = sim.position_state(strategy.max_positions);
            let decision = decide(&strategy.rules, &snapshot, state);
            let can_enter = index + 1 < bars.len();
            sim.apply_decision(decision, history, &arena, can_enter)?;
        }

        let equity = sim
            .portfolio
            .total_equity(bar.close, sim.exec.point_value);
        sim.portfolio.record_equity(bar.timestamp, equity);
    }

    if let Some(last_index) = processed.checked_sub(1) {
        let history = &bars[..=last_index];
        // Only possible after cancellation: nothing may enter on the final bar.
        sim.portfolio
            .positions
            .retain(|p| p.entry_index < last_index);
        sim.close_all(history, ExitReason::EndOfData)?;
        let cash = sim.portfolio.cash;
        if let Some(point) = sim.portfolio.equity_curve.last_mut() {
            point.equity = cash;
        }
    }

    let portfolio = sim.portfolio;
    let metrics = Metrics::compute(
        &portfolio.closed_trades,
        &portfolio.equity_curve,
        config.initial_capital,
        config.risk_free_rate,
    );

    tracing::info!(
        strategy = %strategy.name,
        status = ?status,
        bars_processed = processed,
        trades = portfolio.closed_trades.len(),
        final_equity = portfolio.cash,
        "backtest finished"
    );

    Ok(BacktestResult {
        strategy: strategy.name.clone(),
        symbol: strategy.symbol.clone(),
        timeframe: strategy.timeframe.clone(),
        status,
        bars_processed: processed,
        total_bars: bars.len(),
        initial_capital: config.initial_capital,
        final_equity: portfolio.cash,
        trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
        summary: summarize(strategy, status, processed, bars.len(), &metrics),
        metrics,
        config_issues: strategy.issues.iter().map(ToString::to_string).collect(),
    })
}

fn summarize(
    strategy: &CompiledStrategy,
    status: RunStatus,
    processed: usize,
    total: usize,
    metrics: &Metrics,
) -> String {
    let mut summary = format!(
        "{} on {} ({}): {} trade(s). {}.",
        strategy.name,
        strategy.symbol,
        strategy.timeframe,
        metrics.total_trades,
        metrics.describe()
    );
    if status == RunStatus::Cancelled {
        summary.push_str(&format!(" Cancelled after {} of {} bars.", processed, total));
    }
    summary
}

struct Simulation<'c> {
    config: &'c BacktestConfig,
    exec: ExecutionConfig,
    atr_type: IndicatorType,
    portfolio: Portfolio,
}

impl Simulation<'_> {
    fn position_state(&self, max_positions: usize) -> PositionState {
        match self.portfolio.open_side() {
            None => PositionState::Flat,
            Some(side) => PositionState::InPosition {
                side,
                can_add: self.portfolio.position_count() < max_positions,
            },
        }
    }

    /// Close positions from earlier bars whose stop or target this bar reaches.
    fn apply_risk_exits(&mut self, history: &[Bar]) -> Result<bool, BacktestError> {
        let index = history.len() - 1;
        let bar = &history[index];
        let mut closed_any = false;
        let mut remaining: Vec<Position> = Vec::with_capacity(self.portfolio.positions.len());

        for position in std::mem::take(&mut self.portfolio.positions) {
            let trigger = (position.entry_index < index)
                .then(|| check_exit(position.side, &position.levels, bar, self.config.tie_break))
                .flatten();
            match trigger {
                Some(trigger) => {
                    check_price(history, self.config, trigger.price, "exit")?;
                    let trade = close_position(
                        position,
                        trigger.price,
                        bar.timestamp,
                        index,
                        trigger.reason,
                        &self.exec,
                    );
                    self.book(trade)?;
                    closed_any = true;
                }
                None => remaining.push(position),
            }
        }

        self.portfolio.positions = remaining;
        Ok(closed_any)
    }

    fn apply_decision(
        &mut self,
        decision: Decision,
        history: &[Bar],
        arena: &IndicatorArena,
        can_enter: bool,
    ) -> Result<(), BacktestError> {
        let index = history.len() - 1;
        match decision {
            Decision::Hold | Decision::Wait { .. } => Ok(()),
            Decision::Close { .. } => self.close_all(history, ExitReason::SignalClose),
            Decision::Modify {
                stop_loss,
                take_profit,
                rule,
            } => {
                self.modify(stop_loss.as_ref(), take_profit.as_ref());
                tracing::debug!(bar = index, rule = %rule, "modified exit levels");
                Ok(())
            }
            Decision::Enter {
                side,
                size,
                stop_loss,
                take_profit,
                rule,
            } => {
                if !can_enter {
                    tracing::debug!(bar = index, rule = %rule, "entry skipped on final bar");
                    return Ok(());
                }
                let bar = &history[index];
                let needs_atr = stop_loss
                    .iter()
                    .chain(take_profit.iter())
                    .any(RiskSpec::needs_atr);
                let atr = arena.simple(&self.atr_type, index);
                if needs_atr && atr.is_none() {
                    tracing::debug!(bar = index, rule = %rule, "entry skipped, ATR unavailable");
                    return Ok(());
                }
                let Some(levels) = resolve_levels(
                    side,
                    bar.close,
                    stop_loss.as_ref(),
                    take_profit.as_ref(),
                    atr,
                ) else {
                    tracing::debug!(bar = index, rule = %rule, "entry skipped, levels unresolved");
                    return Ok(());
                };
                check_price(history, self.config, bar.close, "entry")?;
                let order = EntryOrder {
                    side,
                    size,
                    levels,
                    atr_at_entry: atr,
                    rule,
                };
                let position = open_position(order, bar.close, bar.timestamp, index, &self.exec);
                self.portfolio.add_position(position);
                Ok(())
            }
        }
    }

    /// Re-anchor levels at each position's entry price and entry ATR. A spec
    /// that is absent or cannot resolve leaves that level unchanged.
    fn modify(&mut self, stop_loss: Option<&RiskSpec>, take_profit: Option<&RiskSpec>) {
        for position in &mut self.portfolio.positions {
            if let Some(levels) = resolve_levels(
                position.side,
                position.entry_price,
                stop_loss,
                None,
                position.atr_at_entry,
            ) {
                if levels.stop_loss.is_some() {
                    position.levels.stop_loss = levels.stop_loss;
                }
            }
            if let Some(levels) = resolve_levels(
                position.side,
                position.entry_price,
                None,
                take_profit,
                position.atr_at_entry,
            ) {
                if levels.take_profit.is_some() {
                    position.levels.take_profit = levels.take_profit;
                }
            }
        }
    }

    fn close_all(&mut self, history: &[Bar], reason: ExitReason) -> Result<(), BacktestError> {
        if self.portfolio.is_flat() {
            return Ok(());
        }
        let index = history.len() - 1;
        let bar = &history[index];
        check_price(history, self.config, bar.close, "exit")?;
        for position in std::mem::take(&mut self.portfolio.positions) {
            let trade =
                close_position(position, bar.close, bar.timestamp, index, reason, &self.exec);
            self.book(trade)?;
        }
        Ok(())
    }

    fn book(&mut self, trade: Trade) -> Result<(), BacktestError> {
        if !trade.net_pnl.is_finite() {
            return Err(DataIntegrityError::NonFinitePnl {
                index: trade.exit_index,
                timestamp: trade.exit_timestamp,
            }
            .into());
        }
        self.portfolio.record_trade(trade);
        Ok(())
    }
}

/// Structural checks for `bars[index]`.
fn validate_bar(bars: &[Bar], index: usize) -> Result<(), DataIntegrityError> {
    let bar = &bars[index];
    if let Some(field) = bar.non_finite_field() {
        return Err(DataIntegrityError::NonFiniteValue {
            index,
            timestamp: bar.timestamp,
            field,
        });
    }
    if bar.high < bar.low {
        return Err(DataIntegrityError::InvertedRange {
            index,
            timestamp: bar.timestamp,
            high: bar.high,
            low: bar.low,
        });
    }
    if let Some(prev) = index.checked_sub(1).map(|i| &bars[i]) {
        if bar.timestamp <= prev.timestamp {
            return Err(DataIntegrityError::NonMonotonicTimestamp {
                index,
                timestamp: bar.timestamp,
                previous: prev.timestamp,
            });
        }
    }
    Ok(())
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// A trade price must be positive and within a factor of the median of the
/// recent closes.
fn check_price(
    history: &[Bar],
    config: &BacktestConfig,
    price: f64,
    context: &'static str,
) -> Result<(), DataIntegrityError> {
    let index = history.len() - 1;
    let start = history.len().saturating_sub(config.sanity_window);
    let mut closes: Vec<f64> = history[start..].iter().map(|b| b.close).collect();
    let median = median(&mut closes);
    let factor = config.sanity_factor;

    let plausible = price.is_finite()
        && price > 0.0
        && price >= median / factor
        && price <= median * factor;
    if plausible {
        return Ok(());
    }
    Err(DataIntegrityError::ImplausiblePrice {
        index,
        timestamp: history[index].timestamp,
        context,
        price,
        median,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::bar_at;
    use crate::domain::strategy::{ActionParameters, RiskDefinition, RuleDefinition, Strategy};

    fn flat_bar(i: usize, price: f64) -> Bar {
        bar_at(i, price, price, price, price, 1000.0)
    }

    fn spike_bars() -> Vec<Bar> {
        (0..100)
            .map(|i| if i == 50 { flat_bar(i, 150.0) } else { flat_bar(i, 100.0) })
            .collect()
    }

    fn condition(name: &str, left: &str, op: &str, right: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.into(),
            rule_type: "condition".into(),
            left_operand: Some(left.into()),
            operator: Some(op.into()),
            right_operand: Some(right.into()),
            ..RuleDefinition::default()
        }
    }

    fn action(name: &str, action_type: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.into(),
            rule_type: "action".into(),
            action_type: Some(action_type.into()),
            ..RuleDefinition::default()
        }
    }

    fn risk(kind: &str, value: f64) -> Option<RiskDefinition> {
        Some(RiskDefinition::new(kind, value))
    }

    fn strategy(rules: Vec<RuleDefinition>) -> Strategy {
        Strategy {
            name: "test".into(),
            description: String::new(),
            symbol: "TEST".into(),
            timeframe: "1d".into(),
            rules,
            stop_loss: risk("percentage", 5.0),
            take_profit: risk("percentage", 10.0),
            max_positions: 1,
        }
    }

    fn spike_strategy() -> CompiledStrategy {
        strategy(vec![
            condition("spike", "price", "gt", "120"),
            action("enter", "buy"),
        ])
        .compile(None)
    }

    #[test]
    fn spike_produces_single_stop_loss_trade() {
        let result =
            run_backtest(&spike_bars(), &spike_strategy(), &BacktestConfig::default(), None)
                .unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 50);
        assert_eq!(trade.entry_price, 150.0);
        assert_eq!(trade.exit_index, 51);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!((trade.exit_price - 142.5).abs() < 1e-9);
        assert!((trade.net_pnl + 7.5).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 100);
    }

    #[test]
    fn no_signal_means_no_trades() {
        let bars: Vec<Bar> = (0..20).map(|i| flat_bar(i, 100.0)).collect();
        let result = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.total_trades, 0);
        assert_eq!(result.final_equity, 100_000.0);
    }

    #[test]
    fn open_position_closed_at_end_of_data() {
        let bars: Vec<Bar> = (0..10).map(|i| flat_bar(i, 100.0 + i as f64)).collect();
        let mut s = strategy(vec![
            condition("always", "close", "gt", "0"),
            action("enter", "buy"),
        ]);
        s.stop_loss = None;
        s.take_profit = None;
        let result = run_backtest(&bars, &s.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert_eq!(trade.entry_index, 0);
        assert_eq!(trade.exit_index, 9);
        assert!((trade.net_pnl - 9.0).abs() < 1e-9);
        let last = result.equity_curve.last().unwrap();
        assert!((last.equity - 100_009.0).abs() < 1e-9);
    }

    #[test]
    fn no_entry_on_final_bar() {
        let mut bars: Vec<Bar> = (0..5).map(|i| flat_bar(i, 100.0)).collect();
        bars[4] = flat_bar(4, 150.0);
        let result = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn signal_close_and_reentry_on_later_bar() {
        let prices = [100.0, 130.0, 130.0, 110.0, 130.0, 130.0];
        let bars: Vec<Bar> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| flat_bar(i, p))
            .collect();
        let mut s = strategy(vec![
            condition("up", "close", "gt", "120"),
            action("enter", "buy"),
            condition("down", "close", "lt", "120"),
            action("exit", "close"),
        ]);
        s.stop_loss = None;
        s.take_profit = None;
        let result = run_backtest(&bars, &s.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].exit_reason, ExitReason::SignalClose);
        assert_eq!(result.trades[0].exit_index, 3);
        assert_eq!(result.trades[1].entry_index, 4);
        assert_eq!(result.trades[1].exit_reason, ExitReason::EndOfData);
    }

    #[test]
    fn atr_entry_skipped_during_warmup() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| bar_at(i, 100.0, 101.0, 99.0, 100.0, 10.0))
            .collect();
        let mut s = strategy(vec![
            condition("always", "close", "gt", "0"),
            action("enter", "buy"),
        ]);
        s.stop_loss = risk("atr", 2.0);
        s.take_profit = None;
        let config = BacktestConfig {
            atr_period: 3,
            ..Default::default()
        };
        let result = run_backtest(&bars, &s.compile(None), &config, None).unwrap();
        assert_eq!(result.trades.len(), 1);
        // ATR(3) first available at index 2
        assert_eq!(result.trades[0].entry_index, 2);
    }

    #[test]
    fn non_monotonic_timestamp_is_fatal() {
        let mut bars: Vec<Bar> = (0..5).map(|i| flat_bar(i, 100.0)).collect();
        bars[3].timestamp = bars[2].timestamp;
        let err = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap_err();
        match err {
            BacktestError::DataIntegrity(e) => {
                assert!(matches!(e, DataIntegrityError::NonMonotonicTimestamp { .. }));
                assert_eq!(e.index(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_finite_and_inverted_bars_are_fatal() {
        let mut bars: Vec<Bar> = (0..5).map(|i| flat_bar(i, 100.0)).collect();
        bars[2].close = f64::NAN;
        let err = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataIntegrity(DataIntegrityError::NonFiniteValue {
                index: 2,
                field: "close",
                ..
            })
        ));

        let mut bars: Vec<Bar> = (0..5).map(|i| flat_bar(i, 100.0)).collect();
        bars[1].low = 120.0;
        let err = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataIntegrity(DataIntegrityError::InvertedRange { index: 1, .. })
        ));
    }

    #[test]
    fn implausible_entry_price_is_fatal() {
        let mut bars: Vec<Bar> = (0..20).map(|i| flat_bar(i, 100.0)).collect();
        bars[10] = flat_bar(10, 5000.0);
        let err = run_backtest(&bars, &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataIntegrity(DataIntegrityError::ImplausiblePrice {
                index: 10,
                context: "entry",
                ..
            })
        ));
    }

    #[test]
    fn empty_bars_rejected() {
        let err = run_backtest(&[], &spike_strategy(), &BacktestConfig::default(), None)
            .unwrap_err();
        assert_eq!(err, BacktestError::NoBars);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = BacktestConfig {
            initial_capital: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            run_backtest(&spike_bars(), &spike_strategy(), &config, None),
            Err(BacktestError::InvalidConfig { .. })
        ));
        let config = BacktestConfig {
            slippage_pct: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn preset_cancel_flag_processes_nothing() {
        let flag = AtomicBool::new(true);
        let result = run_backtest(
            &spike_bars(),
            &spike_strategy(),
            &BacktestConfig::default(),
            Some(&flag),
        )
        .unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.bars_processed, 0);
        assert_eq!(result.total_bars, 100);
        assert!(result.trades.is_empty());
    }

    fn pyramiding_strategy() -> CompiledStrategy {
        let mut s = strategy(vec![
            condition("always", "close", "gt", "0"),
            action("enter", "buy"),
        ]);
        s.stop_loss = None;
        s.take_profit = None;
        s.max_positions = 10;
        s.compile(None)
    }

    #[test]
    fn cancel_mid_run_keeps_partial_result() {
        let bars: Vec<Bar> = (0..20).map(|i| flat_bar(i, 100.0 + i as f64)).collect();
        let flag = AtomicBool::new(false);
        let result = simulate(&bars, &pyramiding_strategy(), &BacktestConfig::default(), |index| {
            if index == 5 {
                flag.store(true, Ordering::Relaxed);
            }
            flag.load(Ordering::Relaxed)
        })
        .unwrap();

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.bars_processed, 5);
        assert_eq!(result.total_bars, 20);
        assert!(result.bars_processed > 0 && result.bars_processed < result.total_bars);

        // bars 0..=3 entries are closed on bar 4; the bar 4 entry is dropped
        assert_eq!(result.trades.len(), 4);
        for (i, trade) in result.trades.iter().enumerate() {
            assert_eq!(trade.entry_index, i);
            assert_eq!(trade.exit_index, 4);
            assert_eq!(trade.exit_reason, ExitReason::EndOfData);
            assert_eq!(trade.exit_price, 104.0);
        }
        assert!((result.final_equity - 100_010.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 5);
        assert_eq!(
            result.equity_curve.last().unwrap().equity,
            result.final_equity
        );
        assert!(result.summary.contains("Cancelled after 5 of 20 bars"));
    }

    #[test]
    fn flag_left_clear_runs_to_completion() {
        let bars: Vec<Bar> = (0..20).map(|i| flat_bar(i, 100.0 + i as f64)).collect();
        let flag = AtomicBool::new(false);
        let result = run_backtest(
            &bars,
            &pyramiding_strategy(),
            &BacktestConfig::default(),
            Some(&flag),
        )
        .unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.bars_processed, 20);
        // no entry on the final bar
        assert_eq!(result.trades.len(), 10);
        assert!(result.trades.iter().all(|t| t.exit_index == 19));
    }

    #[test]
    fn summary_names_run_and_verdict() {
        let result =
            run_backtest(&spike_bars(), &spike_strategy(), &BacktestConfig::default(), None)
                .unwrap();
        assert!(result.summary.starts_with("test on TEST (1d): 1 trade(s)."));
        assert!(result.summary.contains(&result.metrics.describe()));
        assert!(!result.summary.contains("Cancelled"));
    }

    #[test]
    fn config_issues_are_carried_into_result() {
        let s = strategy(vec![
            condition("bad", "sma_twenty", "gt", "1"),
            action("enter", "buy"),
        ]);
        let result = run_backtest(&spike_bars(), &s.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.config_issues.len(), 1);
        assert!(result.config_issues[0].contains("sma_twenty"));
        assert!(result.trades.is_empty());
    }

    #[test]
    fn pyramiding_adds_same_side_positions() {
        let bars: Vec<Bar> = (0..6).map(|i| flat_bar(i, 100.0 + i as f64)).collect();
        let mut s = strategy(vec![
            condition("always", "close", "gt", "0"),
            action("enter", "buy"),
        ]);
        s.stop_loss = None;
        s.take_profit = None;
        s.max_positions = 3;
        let result = run_backtest(&bars, &s.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.trades.len(), 3);
        assert!(result
            .trades
            .iter()
            .all(|t| t.exit_reason == ExitReason::EndOfData));
    }

    #[test]
    fn modify_moves_stop() {
        // Enter at 100 with a 5% stop, then re-anchor the stop once price
        // reaches 105.
        let prices = [100.0, 105.0, 99.0, 98.0];
        let bars: Vec<Bar> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| flat_bar(i, p))
            .collect();
        let mut tighten = action("tighten", "modify");
        tighten.parameters = ActionParameters {
            size: None,
            stop_loss: risk("points", 4.0),
            take_profit: None,
        };
        let mut s = strategy(vec![
            condition("start", "close", "lt", "101"),
            action("enter", "buy"),
            condition("up", "close", "gt", "104"),
            tighten,
        ]);
        s.take_profit = None;
        let result = run_backtest(&bars, &s.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfData);

        let mut s2 = s.clone();
        if let Some(params) = s2.rules.get_mut(3).map(|r| &mut r.parameters) {
            params.stop_loss = risk("points", 0.5);
        }
        let result = run_backtest(&bars, &s2.compile(None), &BacktestConfig::default(), None)
            .unwrap();
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert!((result.trades[0].exit_price - 99.5).abs() < 1e-9);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&mut Vec::<f64>::new()), 0.0);
    }
}
