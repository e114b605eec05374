#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rulebench::domain::error::RulebenchError;
pub use rulebench::domain::ohlcv::Bar;
use rulebench::domain::strategy::{RiskDefinition, RuleDefinition, Strategy};
use rulebench::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str, _timeframe: &str) -> Result<Vec<Bar>, RulebenchError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RulebenchError::Data {
                source_name: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }
}

pub fn timestamp(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(i as i64)
}

pub fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: timestamp(i),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

pub fn flat_bar(i: usize, price: f64) -> Bar {
    make_bar(i, price, price, price, price)
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| flat_bar(i, c))
        .collect()
}

/// 100 bars at 100 with a single bar at 150 (index 50).
pub fn flat_bars_with_spike() -> Vec<Bar> {
    (0..100)
        .map(|i| flat_bar(i, if i == 50 { 150.0 } else { 100.0 }))
        .collect()
}

/// A smooth oscillation between roughly 90 and 110.
pub fn wave_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let c = 100.0 + (i as f64 * 0.3).sin() * 10.0;
            make_bar(i, c, c + 0.5, c - 0.5, c)
        })
        .collect()
}

pub fn condition(name: &str, left: &str, op: &str, right: &str) -> RuleDefinition {
    RuleDefinition {
        name: name.into(),
        rule_type: "condition".into(),
        left_operand: Some(left.into()),
        operator: Some(op.into()),
        right_operand: Some(right.into()),
        ..RuleDefinition::default()
    }
}

pub fn action(name: &str, action_type: &str) -> RuleDefinition {
    RuleDefinition {
        name: name.into(),
        rule_type: "action".into(),
        action_type: Some(action_type.into()),
        ..RuleDefinition::default()
    }
}

pub fn risk(kind: &str, value: f64) -> Option<RiskDefinition> {
    Some(RiskDefinition::new(kind, value))
}

pub fn make_strategy(name: &str, rules: Vec<RuleDefinition>) -> Strategy {
    Strategy {
        name: name.into(),
        description: String::new(),
        symbol: "TEST".into(),
        timeframe: "1d".into(),
        rules,
        stop_loss: None,
        take_profit: None,
        max_positions: 1,
    }
}

/// Buy when price > 120 with a 10% target and 5% stop.
pub fn spike_strategy() -> Strategy {
    let mut s = make_strategy(
        "Spike",
        vec![
            condition("spike", "price", "gt", "120"),
            action("enter", "buy"),
        ],
    );
    s.stop_loss = risk("percentage", 5.0);
    s.take_profit = risk("percentage", 10.0);
    s
}

/// Long on a close crossing above its 5-bar SMA, flat on a cross below.
pub fn sma_cross_strategy() -> Strategy {
    let mut s = make_strategy(
        "SMA Cross",
        vec![
            condition("up", "close", "crosses_above", "sma_5"),
            action("enter", "buy"),
            condition("down", "close", "crosses_below", "sma_5"),
            action("exit", "close"),
        ],
    );
    s.stop_loss = risk("percentage", 8.0);
    s
}

pub const SPIKE_STRATEGY_INI: &str = r#"
[strategy]
name = Spike
symbol = TEST
timeframe = 1d
stop_loss = percentage:5
take_profit = percentage:10

[rule.a_spike]
rule_type = condition
left_operand = price
operator = gt
right_operand = 120

[rule.b_enter]
rule_type = action
action_type = buy
"#;

pub const RUN_INI: &str = r#"
[backtest]
initial_capital = 100000
commission_per_trade = 0
risk_free_rate = 0.02

[instrument]
point_value = 1

[risk]
atr_period = 14
tie_break = stop_loss_first
"#;

pub fn spike_csv() -> String {
    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for bar in flat_bars_with_spike() {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    csv
}
