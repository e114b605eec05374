//! Operand key parser and rule compiler.
//!
//! Operand keys come in two spellings, both case-insensitive:
//! - snake keys: `close`, `rsi`, `rsi_7`, `sma_20`, `macd_signal_12_26_9`, `bb_upper_20_2.5`
//! - call form:  `SMA(20)`, `MACD_SIGNAL(12,26,9)`, `BOLLINGER_UPPER(20,2.5)`
//!
//! Numeric literals are constants. Parameters omitted from `rsi`, `atr`,
//! `macd_*`, `stoch_*` and `bb_*` take the usual defaults.
//!
//! `compile_rules` turns raw rule definitions into ordered, fully resolved
//! [`Rule`]s. A definition that fails to compile becomes an inert rule and
//! yields one [`ConfigError`].

use crate::domain::error::{ConfigError, ParseError};
use crate::domain::indicator::{bollinger, macd, stochastic, IndicatorType};
use crate::domain::risk::{RiskSpec, DEFAULT_ATR_PERIOD};
use crate::domain::rule::{
    Action, ActionType, Condition, ConditionType, IndicatorField, IndicatorRef, LogicalOperator,
    Operand, Operator, PriceField, Rule, RuleKind, RuleType, TimeField,
};
use crate::domain::strategy::{RiskDefinition, RuleDefinition};

const DEFAULT_RSI_PERIOD: usize = 14;
const MAX_PERIOD: f64 = 100_000.0;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(ParseError {
                message: format!("unexpected trailing input '{}'", self.remaining()),
                position: self.pos,
            }),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    /// Letters joined by underscores. An underscore followed by a digit ends
    /// the name, since it starts a snake-key parameter.
    fn parse_name(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphabetic() {
                self.advance();
            } else if ch == '_' && self.peek_second().is_some_and(|c| c.is_ascii_alphabetic()) {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(ParseError {
                message: match self.peek() {
                    Some(ch) => format!("expected operand, found '{}'", ch),
                    None => "expected operand, found end of input".to_string(),
                },
                position: start,
            });
        }
        Ok(&self.input[start..self.pos])
    }

    /// `(a, b, ...)` or `_a_b...`, each with the position it started at.
    fn parse_params(&mut self) -> Result<Vec<(f64, usize)>, ParseError> {
        let mut params = Vec::new();
        if self.peek() == Some('(') {
            self.advance();
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                return Ok(params);
            }
            loop {
                self.skip_whitespace();
                let at = self.pos;
                params.push((self.parse_number()?, at));
                self.skip_whitespace();
                if self.peek() == Some(',') {
                    self.advance();
                    continue;
                }
                self.expect_char(')')?;
                break;
            }
        } else {
            while self.peek() == Some('_') {
                self.advance();
                let at = self.pos;
                params.push((self.parse_number()?, at));
            }
        }
        Ok(params)
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            let num = self.parse_number()?;
            self.expect_end()?;
            return Ok(Operand::Constant(num));
        }

        let name_pos = self.pos;
        let name = self.parse_name()?;
        let params = self.parse_params()?;
        self.expect_end()?;
        resolve_name(name, &params, name_pos)
    }
}

fn no_params(name: &str, params: &[(f64, usize)], operand: Operand) -> Result<Operand, ParseError> {
    match params.first() {
        None => Ok(operand),
        Some((_, at)) => Err(ParseError {
            message: format!("'{}' takes no parameters", name),
            position: *at,
        }),
    }
}

fn period(param: (f64, usize)) -> Result<usize, ParseError> {
    let (value, at) = param;
    if value.fract() != 0.0 || value < 1.0 || value > MAX_PERIOD {
        return Err(ParseError {
            message: format!("period must be a positive integer, found {}", value),
            position: at,
        });
    }
    Ok(value as usize)
}

fn arity_error(name: &str, expected: &str, params: &[(f64, usize)], pos: usize) -> ParseError {
    ParseError {
        message: format!(
            "'{}' expects {} parameter(s), found {}",
            name,
            expected,
            params.len()
        ),
        position: params.first().map_or(pos, |(_, at)| *at),
    }
}

fn indicator(indicator_type: IndicatorType, field: IndicatorField) -> Operand {
    Operand::Indicator(IndicatorRef {
        indicator_type,
        field,
    })
}

fn resolve_name(name: &str, params: &[(f64, usize)], pos: usize) -> Result<Operand, ParseError> {
    let name = name.to_ascii_lowercase();
    let name = name.as_str();

    match name {
        "open" | "open_price" => return no_params(name, params, Operand::Price(PriceField::Open)),
        "high" | "high_price" => return no_params(name, params, Operand::Price(PriceField::High)),
        "low" | "low_price" => return no_params(name, params, Operand::Price(PriceField::Low)),
        "close" | "close_price" | "price" => {
            return no_params(name, params, Operand::Price(PriceField::Close));
        }
        "volume" => return no_params(name, params, Operand::Price(PriceField::Volume)),
        "hour" => return no_params(name, params, Operand::Time(TimeField::Hour)),
        "minute" => return no_params(name, params, Operand::Time(TimeField::Minute)),
        "weekday" | "day_of_week" => {
            return no_params(name, params, Operand::Time(TimeField::Weekday));
        }
        "obv" => {
            let obv = indicator(IndicatorType::Obv, IndicatorField::Value);
            return no_params(name, params, obv);
        }
        _ => {}
    }

    let single_period = |ctor: fn(usize) -> IndicatorType| -> Result<Operand, ParseError> {
        match params {
            [p] => Ok(indicator(ctor(period(*p)?), IndicatorField::Value)),
            _ => Err(arity_error(name, "1", params, pos)),
        }
    };
    let optional_period =
        |ctor: fn(usize) -> IndicatorType, default: usize| -> Result<Operand, ParseError> {
            match params {
                [] => Ok(indicator(ctor(default), IndicatorField::Value)),
                [p] => Ok(indicator(ctor(period(*p)?), IndicatorField::Value)),
                _ => Err(arity_error(name, "0 or 1", params, pos)),
            }
        };

    match name {
        "sma" => single_period(IndicatorType::Sma),
        "ema" => single_period(IndicatorType::Ema),
        "wma" => single_period(IndicatorType::Wma),
        "roc" => single_period(IndicatorType::Roc),
        "stddev" => single_period(IndicatorType::Stddev),
        "rsi" => optional_period(IndicatorType::Rsi, DEFAULT_RSI_PERIOD),
        "atr" => optional_period(IndicatorType::Atr, DEFAULT_ATR_PERIOD),
        "vwap" => match params {
            [] => Ok(indicator(IndicatorType::Vwap(None), IndicatorField::Value)),
            [p] => Ok(indicator(
                IndicatorType::Vwap(Some(period(*p)?)),
                IndicatorField::Value,
            )),
            _ => Err(arity_error(name, "0 or 1", params, pos)),
        },
        "macd" | "macd_line" | "macd_signal" | "macd_histogram" | "macd_hist" => {
            let field = match name {
                "macd_signal" => IndicatorField::MacdSignal,
                "macd_histogram" | "macd_hist" => IndicatorField::MacdHistogram,
                _ => IndicatorField::MacdLine,
            };
            let indicator_type = match params {
                [] => IndicatorType::Macd {
                    fast: macd::DEFAULT_FAST,
                    slow: macd::DEFAULT_SLOW,
                    signal: macd::DEFAULT_SIGNAL,
                },
                [f, s, g] => IndicatorType::Macd {
                    fast: period(*f)?,
                    slow: period(*s)?,
                    signal: period(*g)?,
                },
                _ => return Err(arity_error(name, "0 or 3", params, pos)),
            };
            Ok(indicator(indicator_type, field))
        }
        "stoch_k" | "stochastic_k" | "stoch_d" | "stochastic_d" => {
            let field = if name.ends_with('k') {
                IndicatorField::StochasticK
            } else {
                IndicatorField::StochasticD
            };
            let indicator_type = match params {
                [] => IndicatorType::Stochastic {
                    k_period: stochastic::DEFAULT_K,
                    d_period: stochastic::DEFAULT_D,
                },
                [k, d] => IndicatorType::Stochastic {
                    k_period: period(*k)?,
                    d_period: period(*d)?,
                },
                _ => return Err(arity_error(name, "0 or 2", params, pos)),
            };
            Ok(indicator(indicator_type, field))
        }
        "bb_upper" | "bb_middle" | "bb_lower" | "bollinger_upper" | "bollinger_middle"
        | "bollinger_lower" => {
            let field = if name.ends_with("upper") {
                IndicatorField::BollingerUpper
            } else if name.ends_with("middle") {
                IndicatorField::BollingerMiddle
            } else {
                IndicatorField::BollingerLower
            };
            let (p, mult_x100) = match params {
                [] => (bollinger::DEFAULT_PERIOD, bollinger::DEFAULT_MULT_X100),
                [p] => (period(*p)?, bollinger::DEFAULT_MULT_X100),
                [p, (m, at)] => (period(*p)?, multiplier_x100(*m, *at)?),
                _ => return Err(arity_error(name, "0, 1 or 2", params, pos)),
            };
            Ok(indicator(
                IndicatorType::Bollinger {
                    period: p,
                    stddev_mult_x100: mult_x100,
                },
                field,
            ))
        }
        _ => Err(ParseError {
            message: format!("unknown operand '{}'", name),
            position: pos,
        }),
    }
}

/// Bollinger multipliers are keyed in hundredths; anything finer is rejected
/// rather than rounded.
fn multiplier_x100(m: f64, at: usize) -> Result<u32, ParseError> {
    if !(m.is_finite() && m > 0.0) {
        return Err(ParseError {
            message: format!("multiplier must be positive, found {}", m),
            position: at,
        });
    }
    let scaled = m * 100.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 || rounded < 1.0 || rounded > f64::from(u32::MAX) {
        return Err(ParseError {
            message: format!("multiplier must have at most two decimals, found {}", m),
            position: at,
        });
    }
    Ok(rounded as u32)
}

/// Parse one operand key.
pub fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError {
            message: "empty operand".to_string(),
            position: 0,
        });
    }
    let mut parser = Parser::new(input);
    parser.parse_operand()
}

/// Output of [`compile_rules`]: ordered rules plus every issue found.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub rules: Vec<Rule>,
    pub issues: Vec<ConfigError>,
}

/// Validate a raw risk definition.
pub fn compile_risk(
    def: &RiskDefinition,
    tick_size: Option<f64>,
    context: &str,
) -> Result<RiskSpec, ConfigError> {
    let value = def
        .value
        .to_f64()
        .ok_or_else(|| ConfigError::MalformedRiskValue {
            context: context.to_string(),
            value: def.value.to_string(),
        })?;
    RiskSpec::new(&def.kind, value, tick_size, context)
}

/// Compile active rule definitions in `(priority, order)` order.
///
/// `default_stop` / `default_target` fill in for entry actions that carry no
/// risk spec of their own.
pub fn compile_rules(
    defs: &[RuleDefinition],
    tick_size: Option<f64>,
    default_stop: Option<&RiskSpec>,
    default_target: Option<&RiskSpec>,
) -> CompiledRules {
    let mut active: Vec<&RuleDefinition> = defs.iter().filter(|d| d.is_active).collect();
    active.sort_by_key(|d| (d.priority, d.order));

    let mut out = CompiledRules::default();
    let mut guarded = false;

    for def in active {
        let rule = compile_rule(def, tick_size, default_stop, default_target);
        match &rule.kind {
            RuleKind::Inert { error, rule_type, .. } => {
                out.issues.push(error.clone());
                match rule_type {
                    RuleType::Condition => guarded = true,
                    RuleType::Action => guarded = false,
                    RuleType::Filter => {}
                }
            }
            RuleKind::Condition(_) => guarded = true,
            RuleKind::Filter(_) => {}
            RuleKind::Action(_) => {
                if !guarded {
                    out.issues.push(ConfigError::UnguardedAction {
                        rule: rule.name.clone(),
                    });
                }
                guarded = false;
            }
        }
        out.rules.push(rule);
    }
    out
}

fn compile_rule(
    def: &RuleDefinition,
    tick_size: Option<f64>,
    default_stop: Option<&RiskSpec>,
    default_target: Option<&RiskSpec>,
) -> Rule {
    let declared_type = def.rule_type.parse::<RuleType>().ok();
    let logical = def
        .logical_operator
        .as_deref()
        .and_then(|s| s.parse::<LogicalOperator>().ok())
        .unwrap_or_default();

    let kind = match compile_kind(def, declared_type, tick_size, default_stop, default_target) {
        Ok(kind) => kind,
        Err(error) => RuleKind::Inert {
            rule_type: declared_type.unwrap_or(RuleType::Condition),
            logical,
            error,
        },
    };

    Rule {
        name: def.name.clone(),
        priority: def.priority,
        order: def.order,
        kind,
    }
}

fn compile_kind(
    def: &RuleDefinition,
    declared_type: Option<RuleType>,
    tick_size: Option<f64>,
    default_stop: Option<&RiskSpec>,
    default_target: Option<&RiskSpec>,
) -> Result<RuleKind, ConfigError> {
    let rule_type = declared_type.ok_or_else(|| ConfigError::InvalidField {
        rule: def.name.clone(),
        field: "rule_type",
        value: def.rule_type.clone(),
    })?;

    match rule_type {
        RuleType::Condition => Ok(RuleKind::Condition(compile_condition(def)?)),
        RuleType::Filter => Ok(RuleKind::Filter(compile_condition(def)?)),
        RuleType::Action => Ok(RuleKind::Action(compile_action(
            def,
            tick_size,
            default_stop,
            default_target,
        )?)),
    }
}

fn required<'d>(
    def: &'d RuleDefinition,
    value: &'d Option<String>,
    field: &'static str,
) -> Result<&'d str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField {
            rule: def.name.clone(),
            field,
        }),
    }
}

fn compile_operand(def: &RuleDefinition, key: &str) -> Result<Operand, ConfigError> {
    parse_operand(key).map_err(|e| ConfigError::UnknownOperand {
        rule: def.name.clone(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn compile_condition(def: &RuleDefinition) -> Result<Condition, ConfigError> {
    let left = compile_operand(def, required(def, &def.left_operand, "left_operand")?)?;
    let operator_str = required(def, &def.operator, "operator")?;
    let operator = operator_str
        .parse::<Operator>()
        .map_err(|_| ConfigError::UnknownOperator {
            rule: def.name.clone(),
            operator: operator_str.to_string(),
        })?;
    let right = compile_operand(def, required(def, &def.right_operand, "right_operand")?)?;

    let condition_type = match def.condition_type.as_deref() {
        None => ConditionType::default(),
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidField {
            rule: def.name.clone(),
            field: "condition_type",
            value: s.to_string(),
        })?,
    };
    let logical = match def.logical_operator.as_deref() {
        None => LogicalOperator::default(),
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidField {
            rule: def.name.clone(),
            field: "logical_operator",
            value: s.to_string(),
        })?,
    };

    Ok(Condition {
        condition_type,
        left,
        operator,
        right,
        logical,
    })
}

fn compile_action(
    def: &RuleDefinition,
    tick_size: Option<f64>,
    default_stop: Option<&RiskSpec>,
    default_target: Option<&RiskSpec>,
) -> Result<Action, ConfigError> {
    let action_str = required(def, &def.action_type, "action_type")?;
    let action_type = action_str
        .parse::<ActionType>()
        .map_err(|_| ConfigError::InvalidField {
            rule: def.name.clone(),
            field: "action_type",
            value: action_str.to_string(),
        })?;

    let size = match &def.parameters.size {
        None => 1.0,
        Some(raw) => match raw.to_f64() {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => {
                return Err(ConfigError::InvalidField {
                    rule: def.name.clone(),
                    field: "size",
                    value: raw.to_string(),
                });
            }
        },
    };

    let context = format!("rule '{}'", def.name);
    let own_stop = def
        .parameters
        .stop_loss
        .as_ref()
        .map(|r| compile_risk(r, tick_size, &context))
        .transpose()?;
    let own_target = def
        .parameters
        .take_profit
        .as_ref()
        .map(|r| compile_risk(r, tick_size, &context))
        .transpose()?;

    let entry = matches!(action_type, ActionType::Buy | ActionType::Sell);
    let (stop_loss, take_profit) = if entry {
        (
            own_stop.or(default_stop.copied()),
            own_target.or(default_target.copied()),
        )
    } else {
        (own_stop, own_target)
    };

    Ok(Action {
        action_type,
        size,
        stop_loss,
        take_profit,
    })
}
