//! Rule evaluation engine.
//!
//! Evaluates compiled rules against the snapshot of one bar.
//!
//! # Evaluation Semantics
//!
//! - Comparisons use current-bar values; `eq`/`ne` compare within 1e-6
//! - `crosses_above`/`crosses_below` also read the previous bar and are false
//!   when it does not exist or any of its values is unavailable
//! - An unavailable operand makes the condition false
//! - Conditions guarding one action fold left to right with each rule's own
//!   logical operator; `and` short-circuits, `or` evaluates every rule
//! - Filters guarding an action must all pass
//! - The first guarded action that is valid for the position state wins

use crate::domain::position::Side;
use crate::domain::risk::RiskSpec;
use crate::domain::rule::{
    Action, ActionType, Condition, LogicalOperator, Operator, Rule, RuleKind, RuleType,
};
use crate::domain::snapshot::IndicatorSnapshot;

const EQ_TOLERANCE: f64 = 1e-6;

/// What the simulator should do on this bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Enter {
        side: Side,
        size: f64,
        stop_loss: Option<RiskSpec>,
        take_profit: Option<RiskSpec>,
        rule: String,
    },
    Close {
        rule: String,
    },
    Modify {
        stop_loss: Option<RiskSpec>,
        take_profit: Option<RiskSpec>,
        rule: String,
    },
    Wait {
        rule: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    /// `can_add` is true while fewer than `max_positions` are open.
    InPosition { side: Side, can_add: bool },
}

pub fn evaluate_condition(condition: &Condition, snapshot: &IndicatorSnapshot<'_>) -> bool {
    let (Some(left), Some(right)) = (
        snapshot.resolve(&condition.left),
        snapshot.resolve(&condition.right),
    ) else {
        return false;
    };

    match condition.operator {
        Operator::Gt | Operator::Above => left > right,
        Operator::Gte => left >= right,
        Operator::Lt | Operator::Below => left < right,
        Operator::Lte => left <= right,
        Operator::Eq => (left - right).abs() < EQ_TOLERANCE,
        Operator::Ne => (left - right).abs() >= EQ_TOLERANCE,
        Operator::CrossesAbove | Operator::CrossesBelow => {
            let Some(prev) = snapshot.previous() else {
                return false;
            };
            let (Some(left_prev), Some(right_prev)) =
                (prev.resolve(&condition.left), prev.resolve(&condition.right))
            else {
                return false;
            };
            if condition.operator == Operator::CrossesAbove {
                left_prev <= right_prev && left > right
            } else {
                left_prev >= right_prev && left < right
            }
        }
    }
}

fn fold(acc: Option<bool>, logical: LogicalOperator, eval: impl FnOnce() -> bool) -> bool {
    match (acc, logical) {
        (None, _) => eval(),
        (Some(prev), LogicalOperator::And) => prev && eval(),
        (Some(prev), LogicalOperator::Or) => {
            let current = eval();
            prev || current
        }
    }
}

fn candidate(rule: &Rule, action: &Action, state: PositionState) -> Option<Decision> {
    let entry_side = match action.action_type {
        ActionType::Buy => Some(Side::Long),
        ActionType::Sell => Some(Side::Short),
        _ => None,
    };

    let allowed = match (state, action.action_type) {
        (_, ActionType::Wait) => true,
        (PositionState::Flat, ActionType::Buy | ActionType::Sell) => true,
        (PositionState::Flat, _) => false,
        (PositionState::InPosition { .. }, ActionType::Close | ActionType::Modify) => true,
        (PositionState::InPosition { side, can_add }, _) => can_add && entry_side == Some(side),
    };
    if !allowed {
        return None;
    }

    let rule_name = rule.name.clone();
    Some(match action.action_type {
        ActionType::Buy | ActionType::Sell => Decision::Enter {
            side: entry_side.unwrap_or(Side::Long),
            size: action.size,
            stop_loss: action.stop_loss,
            take_profit: action.take_profit,
            rule: rule_name,
        },
        ActionType::Close => Decision::Close { rule: rule_name },
        ActionType::Modify => Decision::Modify {
            stop_loss: action.stop_loss,
            take_profit: action.take_profit,
            rule: rule_name,
        },
        ActionType::Wait => Decision::Wait { rule: rule_name },
    })
}

/// Decide this bar's action. `rules` must be in `(priority, order)` order.
pub fn decide(rules: &[Rule], snapshot: &IndicatorSnapshot<'_>, state: PositionState) -> Decision {
    let mut acc: Option<bool> = None;
    let mut filters_pass = true;

    for rule in rules {
        match &rule.kind {
            RuleKind::Condition(c) => {
                acc = Some(fold(acc, c.logical, || evaluate_condition(c, snapshot)));
            }
            RuleKind::Filter(c) => {
                filters_pass = filters_pass && evaluate_condition(c, snapshot);
            }
            RuleKind::Inert {
                rule_type: RuleType::Condition,
                logical,
                ..
            } => {
                acc = Some(fold(acc, *logical, || false));
            }
            RuleKind::Inert {
                rule_type: RuleType::Filter,
                ..
            } => {
                filters_pass = false;
            }
            RuleKind::Inert {
                rule_type: RuleType::Action,
                ..
            } => {
                acc = None;
                filters_pass = true;
            }
            RuleKind::Action(action) => {
                let guarded = acc == Some(true) && filters_pass;
                acc = None;
                filters_pass = true;
                if !guarded {
                    continue;
                }
                if let Some(decision) = candidate(rule, action, state) {
                    return decision;
                }
            }
        }
    }
    Decision::Hold
}
