//! Compiled rule model.
//!
//! This module defines what a strategy's rules look like after compilation:
//! - `Operand`: What can be compared (price fields, time fields, constants, indicators)
//! - `IndicatorRef`: Reference to an indicator with a specific field
//! - `Operator`: Comparison and cross-over operators
//! - `Rule`: One ordered rule, either live (`Condition`, `Filter`, `Action`) or `Inert`
//!
//! Every operand is resolved to a closed variant at compile time, so an
//! unknown key can only surface before a run starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::indicator::IndicatorType;
use crate::domain::risk::RiskSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// Calendar fields of the bar timestamp. Weekday counts from Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    Hour,
    Minute,
    Weekday,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Price(PriceField),
    Time(TimeField),
    Constant(f64),
    Indicator(IndicatorRef),
}

impl Operand {
    pub fn indicator_type(&self) -> Option<IndicatorType> {
        match self {
            Operand::Indicator(r) => Some(r.indicator_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRef {
    pub indicator_type: IndicatorType,
    pub field: IndicatorField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Value,
    MacdLine,
    MacdSignal,
    MacdHistogram,
    StochasticK,
    StochasticD,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    Above,
    Below,
    CrossesAbove,
    CrossesBelow,
}

impl Operator {
    pub fn needs_previous(self) -> bool {
        matches!(self, Operator::CrossesAbove | Operator::CrossesBelow)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gt" | ">" => Ok(Operator::Gt),
            "gte" | ">=" => Ok(Operator::Gte),
            "lt" | "<" => Ok(Operator::Lt),
            "lte" | "<=" => Ok(Operator::Lte),
            "eq" | "==" | "=" => Ok(Operator::Eq),
            "ne" | "!=" => Ok(Operator::Ne),
            "above" => Ok(Operator::Above),
            "below" => Ok(Operator::Below),
            "crosses_above" | "cross_above" => Ok(Operator::CrossesAbove),
            "crosses_below" | "cross_below" => Ok(Operator::CrossesBelow),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Above => "above",
            Operator::Below => "below",
            Operator::CrossesAbove => "crosses_above",
            Operator::CrossesBelow => "crosses_below",
        };
        f.write_str(s)
    }
}

/// How a condition joins the conditions before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl FromStr for LogicalOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" | "&&" => Ok(LogicalOperator::And),
            "or" | "||" => Ok(LogicalOperator::Or),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Condition,
    Action,
    Filter,
}

impl FromStr for RuleType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "condition" => Ok(RuleType::Condition),
            "action" => Ok(RuleType::Action),
            "filter" => Ok(RuleType::Filter),
            _ => Err(()),
        }
    }
}

/// Informational category of a condition. Evaluation does not depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConditionType {
    #[default]
    Indicator,
    Price,
    Volume,
    Time,
    Custom,
}

impl FromStr for ConditionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "indicator" => Ok(ConditionType::Indicator),
            "price" => Ok(ConditionType::Price),
            "volume" => Ok(ConditionType::Volume),
            "time" => Ok(ConditionType::Time),
            "custom" => Ok(ConditionType::Custom),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Buy,
    Sell,
    Close,
    Modify,
    Wait,
}

impl FromStr for ActionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(ActionType::Buy),
            "sell" => Ok(ActionType::Sell),
            "close" => Ok(ActionType::Close),
            "modify" => Ok(ActionType::Modify),
            "wait" => Ok(ActionType::Wait),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
    pub logical: LogicalOperator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub action_type: ActionType,
    pub size: f64,
    pub stop_loss: Option<RiskSpec>,
    pub take_profit: Option<RiskSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Condition(Condition),
    Filter(Condition),
    Action(Action),
    /// A rule that failed to compile. Conditions and filters evaluate false,
    /// actions never fire.
    Inert {
        rule_type: RuleType,
        logical: LogicalOperator,
        error: ConfigError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub priority: i32,
    pub order: i32,
    pub kind: RuleKind,
}

impl Rule {
    pub fn ordering_key(&self) -> (i32, i32) {
        (self.priority, self.order)
    }

    pub fn is_inert(&self) -> bool {
        matches!(self.kind, RuleKind::Inert { .. })
    }
}

/// Every distinct indicator the rules reference, in a stable order.
pub fn extract_indicators(rules: &[Rule]) -> Vec<IndicatorType> {
    let mut types: Vec<IndicatorType> = rules
        .iter()
        .filter_map(|rule| match &rule.kind {
            RuleKind::Condition(c) | RuleKind::Filter(c) => Some(c),
            _ => None,
        })
        .flat_map(|c| [c.left.indicator_type(), c.right.indicator_type()])
        .flatten()
        .collect();
    types.sort();
    types.dedup();
    types
}
