//! Strategy descriptors and their compiled form.
//!
//! A [`Strategy`] is the raw, serializable descriptor loaded from JSON or INI.
//! [`Strategy::compile`] validates it into a [`CompiledStrategy`] that the
//! simulator runs. Compilation never fails: broken rules turn inert and every
//! problem is collected in `issues`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::indicator::IndicatorType;
use crate::domain::risk::RiskSpec;
use crate::domain::rule::{extract_indicators, Rule, RuleKind};
use crate::domain::rule_parser::{compile_risk, compile_rules};

fn default_true() -> bool {
    true
}

fn default_max_positions() -> usize {
    1
}

/// A number as written in a strategy file. JSON numbers stay numbers; text
/// (INI values, quoted JSON) is kept verbatim and parsed when compiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Number(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl From<&str> for RawNumber {
    fn from(text: &str) -> Self {
        let text = text.trim();
        match text.parse::<f64>() {
            Ok(v) => RawNumber::Number(v),
            Err(_) => RawNumber::Text(text.to_string()),
        }
    }
}

impl fmt::Display for RawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawNumber::Number(v) => write!(f, "{}", v),
            RawNumber::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Raw `(type, value)` risk distance, e.g. `{"type": "percentage", "value": 5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: RawNumber,
}

impl RiskDefinition {
    pub fn new(kind: &str, value: f64) -> Self {
        RiskDefinition {
            kind: kind.to_string(),
            value: RawNumber::Number(value),
        }
    }
}

impl FromStr for RiskDefinition {
    type Err = String;

    /// Parses the INI shorthand `percentage:5`. Only the shape is checked
    /// here; the value is validated when the strategy is compiled.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("expected '<type>:<value>', got '{}'", s))?;
        Ok(RiskDefinition {
            kind: kind.trim().to_string(),
            value: RawNumber::from(value),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<RawNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<RiskDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<RiskDefinition>,
}

/// One rule as written in a strategy file. Fields are kept as written (text,
/// or [`RawNumber`] for amounts) so that a malformed rule can be reported
/// instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub rule_type: String,
    #[serde(default)]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub left_operand: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub right_operand: Option<String>,
    #[serde(default)]
    pub logical_operator: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub parameters: ActionParameters,
}

impl Default for RuleDefinition {
    fn default() -> Self {
        RuleDefinition {
            name: String::new(),
            rule_type: String::new(),
            condition_type: None,
            left_operand: None,
            operator: None,
            right_operand: None,
            logical_operator: None,
            action_type: None,
            priority: 0,
            order: 0,
            is_active: true,
            parameters: ActionParameters::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub symbol: String,
    pub timeframe: String,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub stop_loss: Option<RiskDefinition>,
    #[serde(default)]
    pub take_profit: Option<RiskDefinition>,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
}

/// A strategy ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStrategy {
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    pub rules: Vec<Rule>,
    pub max_positions: usize,
    pub issues: Vec<ConfigError>,
}

impl Strategy {
    /// Compile against the instrument `tick_size` (needed by `ticks` risk
    /// specs). Each issue is logged once here.
    pub fn compile(&self, tick_size: Option<f64>) -> CompiledStrategy {
        let mut issues = Vec::new();
        let context = format!("strategy '{}' default", self.name);

        let mut default_spec = |def: &Option<RiskDefinition>| -> Option<RiskSpec> {
            match def.as_ref().map(|d| compile_risk(d, tick_size, &context)) {
                Some(Ok(spec)) => Some(spec),
                Some(Err(e)) => {
                    issues.push(e);
                    None
                }
                None => None,
            }
        };
        let default_stop = default_spec(&self.stop_loss);
        let default_target = default_spec(&self.take_profit);

        let compiled = compile_rules(
            &self.rules,
            tick_size,
            default_stop.as_ref(),
            default_target.as_ref(),
        );
        issues.extend(compiled.issues);

        for issue in &issues {
            tracing::warn!(strategy = %self.name, "{}", issue);
        }

        CompiledStrategy {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            rules: compiled.rules,
            max_positions: self.max_positions.max(1),
            issues,
        }
    }
}

impl CompiledStrategy {
    /// Whether any live action resolves a stop or target from ATR.
    pub fn needs_atr(&self) -> bool {
        self.rules.iter().any(|rule| match &rule.kind {
            RuleKind::Action(a) => a
                .stop_loss
                .iter()
                .chain(a.take_profit.iter())
                .any(RiskSpec::needs_atr),
            _ => false,
        })
    }

    /// Every indicator a run must compute: those referenced by the rules plus
    /// `ATR(atr_period)` when a risk spec needs it.
    pub fn indicator_types(&self, atr_period: usize) -> Vec<IndicatorType> {
        let mut types = extract_indicators(&self.rules);
        if self.needs_atr() {
            types.push(IndicatorType::Atr(atr_period));
            types.sort();
            types.dedup();
        }
        types
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
