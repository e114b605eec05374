//! Per-run indicator arena and the per-bar snapshot the evaluator reads.
//!
//! The arena owns one streaming state per distinct indicator and stores every
//! value it produced, keyed by (indicator, bar index). It only grows by
//! `push`, one bar at a time, so a snapshot for bar `i` cannot see anything
//! computed from later bars.

use std::collections::HashMap;

use chrono::{Datelike, Timelike};

use crate::domain::indicator::{Indicator, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;
use crate::domain::rule::{IndicatorField, IndicatorRef, Operand, PriceField, TimeField};

struct Slot {
    state: Box<dyn Indicator>,
    values: Vec<Option<IndicatorValue>>,
}

pub struct IndicatorArena {
    slots: Vec<Slot>,
    index: HashMap<IndicatorType, usize>,
    len: usize,
}

impl IndicatorArena {
    pub fn new<I>(types: I) -> Self
    where
        I: IntoIterator<Item = IndicatorType>,
    {
        let mut arena = IndicatorArena {
            slots: Vec::new(),
            index: HashMap::new(),
            len: 0,
        };
        for t in types {
            if arena.index.contains_key(&t) {
                continue;
            }
            arena.index.insert(t, arena.slots.len());
            arena.slots.push(Slot {
                state: t.build(),
                values: Vec::new(),
            });
        }
        arena
    }

    /// Build an arena and feed it every bar.
    pub fn from_bars<I>(bars: &[Bar], types: I) -> Self
    where
        I: IntoIterator<Item = IndicatorType>,
    {
        let mut arena = Self::new(types);
        for bar in bars {
            arena.push(bar);
        }
        arena
    }

    /// Advance every indicator by one bar.
    pub fn push(&mut self, bar: &Bar) {
        for slot in &mut self.slots {
            let value = slot.state.next(bar);
            slot.values.push(value);
        }
        self.len += 1;
    }

    /// Number of bars pushed so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, indicator_type: &IndicatorType) -> bool {
        self.index.contains_key(indicator_type)
    }

    pub fn value(
        &self,
        indicator_type: &IndicatorType,
        bar_index: usize,
    ) -> Option<IndicatorValue> {
        let slot = self.slots.get(*self.index.get(indicator_type)?)?;
        slot.values.get(bar_index).copied().flatten()
    }

    /// `Simple` value shortcut used for ATR lookups.
    pub fn simple(&self, indicator_type: &IndicatorType, bar_index: usize) -> Option<f64> {
        match self.value(indicator_type, bar_index)? {
            IndicatorValue::Simple(v) => Some(v),
            _ => None,
        }
    }
}

/// Read-only view of one bar: its OHLCV, history up to and including it, and
/// indicator values up to and including it.
#[derive(Clone, Copy)]
pub struct IndicatorSnapshot<'a> {
    history: &'a [Bar],
    arena: &'a IndicatorArena,
}

impl<'a> IndicatorSnapshot<'a> {
    /// Snapshot of the last bar of `history`. Returns `None` for empty history.
    pub fn new(history: &'a [Bar], arena: &'a IndicatorArena) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        Some(IndicatorSnapshot { history, arena })
    }

    pub fn index(&self) -> usize {
        self.history.len() - 1
    }

    pub fn bar(&self) -> &'a Bar {
        &self.history[self.history.len() - 1]
    }

    /// The same view one bar earlier.
    pub fn previous(&self) -> Option<IndicatorSnapshot<'a>> {
        let n = self.history.len();
        IndicatorSnapshot::new(&self.history[..n - 1], self.arena)
    }

    pub fn indicator(&self, indicator_type: &IndicatorType) -> Option<IndicatorValue> {
        self.arena.value(indicator_type, self.index())
    }

    /// Numeric value of an operand on this bar, or `None` when unavailable.
    pub fn resolve(&self, operand: &Operand) -> Option<f64> {
        let bar = self.bar();
        let v = match operand {
            Operand::Price(PriceField::Open) => bar.open,
            Operand::Price(PriceField::High) => bar.high,
            Operand::Price(PriceField::Low) => bar.low,
            Operand::Price(PriceField::Close) => bar.close,
            Operand::Price(PriceField::Volume) => bar.volume,
            Operand::Time(TimeField::Hour) => bar.timestamp.hour() as f64,
            Operand::Time(TimeField::Minute) => bar.timestamp.minute() as f64,
            Operand::Time(TimeField::Weekday) => {
                bar.timestamp.weekday().num_days_from_monday() as f64
            }
            Operand::Constant(c) => *c,
            Operand::Indicator(ind_ref) => return self.resolve_indicator(ind_ref),
        };
        v.is_finite().then_some(v)
    }

    fn resolve_indicator(&self, ind_ref: &IndicatorRef) -> Option<f64> {
        let value = self.indicator(&ind_ref.indicator_type)?;
        extract_field(&value, ind_ref.field)
    }
}

fn extract_field(value: &IndicatorValue, field: IndicatorField) -> Option<f64> {
    match (value, field) {
        (IndicatorValue::Simple(v), IndicatorField::Value) => Some(*v),
        (IndicatorValue::Macd { line, .. }, IndicatorField::MacdLine) => Some(*line),
        (IndicatorValue::Macd { signal, .. }, IndicatorField::MacdSignal) => Some(*signal),
        (IndicatorValue::Macd { histogram, .. }, IndicatorField::MacdHistogram) => {
            Some(*histogram)
        }
        (IndicatorValue::Stochastic { k, .. }, IndicatorField::StochasticK) => Some(*k),
        (IndicatorValue::Stochastic { d, .. }, IndicatorField::StochasticD) => Some(*d),
        (IndicatorValue::Bollinger { upper, .. }, IndicatorField::BollingerUpper) => Some(*upper),
        (IndicatorValue::Bollinger { middle, .. }, IndicatorField::BollingerMiddle) => {
            Some(*middle)
        }
        (IndicatorValue::Bollinger { lower, .. }, IndicatorField::BollingerLower) => Some(*lower),
        _ => None,
    }
}
