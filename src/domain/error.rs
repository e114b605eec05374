//! Domain error types.

use chrono::NaiveDateTime;
use serde::Serialize;

/// A parse error with position information for operand parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// A problem in a strategy descriptor found while compiling it.
///
/// These never abort a run. The offending rule or risk spec becomes inert and
/// the issue is reported once.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("rule '{rule}': unknown operand '{key}' ({reason})")]
    UnknownOperand {
        rule: String,
        key: String,
        reason: String,
    },

    #[error("rule '{rule}': unknown operator '{operator}'")]
    UnknownOperator { rule: String, operator: String },

    #[error("rule '{rule}': invalid {field} '{value}'")]
    InvalidField {
        rule: String,
        field: &'static str,
        value: String,
    },

    #[error("rule '{rule}': missing {field}")]
    MissingField { rule: String, field: &'static str },

    #[error("{context}: unknown risk type '{kind}'")]
    UnknownRiskType { context: String, kind: String },

    #[error("{context}: risk value must be a finite positive number, got '{value}'")]
    MalformedRiskValue { context: String, value: String },

    #[error("{context}: ticks risk requires [instrument] tick_size")]
    MissingTickSize { context: String },

    #[error("action '{rule}' has no guarding condition and will never fire")]
    UnguardedAction { rule: String },
}

/// Fatal problems with the bar data or with prices produced from it.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataIntegrityError {
    #[error("bar {index} ({timestamp}): timestamp is not after previous bar ({previous})")]
    NonMonotonicTimestamp {
        index: usize,
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },

    #[error("bar {index} ({timestamp}): non-finite {field}")]
    NonFiniteValue {
        index: usize,
        timestamp: NaiveDateTime,
        field: &'static str,
    },

    #[error("bar {index} ({timestamp}): high {high} is below low {low}")]
    InvertedRange {
        index: usize,
        timestamp: NaiveDateTime,
        high: f64,
        low: f64,
    },

    #[error(
        "bar {index} ({timestamp}): {context} price {price} is implausible against median {median}"
    )]
    ImplausiblePrice {
        index: usize,
        timestamp: NaiveDateTime,
        context: &'static str,
        price: f64,
        median: f64,
    },

    #[error("bar {index} ({timestamp}): trade net P&L is not finite")]
    NonFinitePnl {
        index: usize,
        timestamp: NaiveDateTime,
    },
}

impl DataIntegrityError {
    /// Index of the offending bar.
    pub fn index(&self) -> usize {
        match self {
            DataIntegrityError::NonMonotonicTimestamp { index, .. }
            | DataIntegrityError::NonFiniteValue { index, .. }
            | DataIntegrityError::InvertedRange { index, .. }
            | DataIntegrityError::ImplausiblePrice { index, .. }
            | DataIntegrityError::NonFinitePnl { index, .. } => *index,
        }
    }
}

/// Failures that stop a single backtest run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BacktestError {
    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("no bars supplied")]
    NoBars,

    #[error("invalid backtest config: {reason}")]
    InvalidConfig { reason: String },
}

/// Top-level error type for rulebench.
#[derive(Debug, thiserror::Error)]
pub enum RulebenchError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error in {source_name}: {reason}")]
    Data { source_name: String, reason: String },

    #[error("strategy '{strategy}' has {count} configuration issue(s)")]
    RuleInvalid { strategy: String, count: usize },

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RulebenchError {
    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            RulebenchError::Io(_) => 1,
            RulebenchError::ConfigParse { .. }
            | RulebenchError::ConfigMissing { .. }
            | RulebenchError::ConfigInvalid { .. } => 2,
            RulebenchError::Data { .. } => 3,
            RulebenchError::RuleInvalid { .. } => 4,
            RulebenchError::Backtest(BacktestError::DataIntegrity(_))
            | RulebenchError::Backtest(BacktestError::NoBars) => 5,
            RulebenchError::Backtest(BacktestError::InvalidConfig { .. }) => 2,
        }
    }
}

impl From<&RulebenchError> for std::process::ExitCode {
    fn from(err: &RulebenchError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
