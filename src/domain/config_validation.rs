//! Configuration validation.
//!
//! Validates run and strategy INI files before anything is built from them.
//! Keys are optional unless noted; a present key must parse and be in range.

use crate::domain::error::RulebenchError;
use crate::domain::risk::TieBreak;
use crate::domain::strategy::RiskDefinition;
use crate::ports::config_port::ConfigPort;

/// Prefix of the per-rule sections in a strategy INI file.
pub const RULE_SECTION_PREFIX: &str = "rule.";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    validate_initial_capital(config)?;
    validate_costs(config)?;
    validate_risk_free_rate(config)?;
    validate_instrument(config)?;
    validate_risk(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    require(config, "strategy", "name")?;
    require(config, "strategy", "symbol")?;
    validate_max_positions(config)?;
    for key in ["stop_loss", "take_profit"] {
        risk_definition(config, "strategy", key)?;
    }
    validate_rule_sections(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RulebenchError {
    RulebenchError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Present, non-blank string value.
pub fn require(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, RulebenchError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(RulebenchError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Numeric value if the key is present.
pub fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, RulebenchError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(
                section,
                key,
                format!("'{}' is not a finite number", s.trim()),
            )),
        },
    }
}

/// Integer value if the key is present.
pub fn integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<i64>, RulebenchError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{}' is not an integer", s.trim()))),
    }
}

/// `type:value` risk shorthand if the key is present. Only a missing `:`
/// fails here; the value itself is checked when the strategy compiles.
pub fn risk_definition(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<RiskDefinition>, RulebenchError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .parse::<RiskDefinition>()
            .map(Some)
            .map_err(|e| invalid(section, key, e)),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    if let Some(value) = number(config, "backtest", "initial_capital")? {
        if value <= 0.0 {
            return Err(invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    for key in ["commission_per_trade", "commission_pct", "slippage_pct"] {
        if let Some(value) = number(config, "backtest", key)? {
            if value < 0.0 {
                return Err(invalid("backtest", key, format!("{} must be non-negative", key)));
            }
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    if let Some(value) = number(config, "backtest", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
    }
    Ok(())
}

fn validate_instrument(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    for key in ["tick_size", "point_value"] {
        if let Some(value) = number(config, "instrument", key)? {
            if value <= 0.0 {
                return Err(invalid("instrument", key, format!("{} must be positive", key)));
            }
        }
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    for key in ["atr_period", "sanity_window"] {
        if let Some(value) = integer(config, "risk", key)? {
            if value < 1 {
                return Err(invalid("risk", key, format!("{} must be at least 1", key)));
            }
        }
    }
    if let Some(value) = number(config, "risk", "sanity_factor")? {
        if value <= 1.0 {
            return Err(invalid(
                "risk",
                "sanity_factor",
                "sanity_factor must be greater than 1",
            ));
        }
    }
    if let Some(s) = config.get_string("risk", "tie_break") {
        if s.parse::<TieBreak>().is_err() {
            return Err(invalid(
                "risk",
                "tie_break",
                format!("'{}' is not stop_loss_first or take_profit_first", s.trim()),
            ));
        }
    }
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    if let Some(value) = integer(config, "strategy", "max_positions")? {
        if value < 1 {
            return Err(invalid(
                "strategy",
                "max_positions",
                "max_positions must be at least 1",
            ));
        }
    }
    Ok(())
}

/// Names of the `[rule.<name>]` sections, sorted.
pub fn rule_sections(config: &dyn ConfigPort) -> Vec<String> {
    let mut sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(RULE_SECTION_PREFIX))
        .collect();
    sections.sort();
    sections
}

fn validate_rule_sections(config: &dyn ConfigPort) -> Result<(), RulebenchError> {
    let sections = rule_sections(config);
    if sections.is_empty() {
        return Err(RulebenchError::ConfigMissing {
            section: format!("{}*", RULE_SECTION_PREFIX),
            key: "rule_type".to_string(),
        });
    }
    for section in &sections {
        require(config, section, "rule_type")?;
        for key in ["priority", "order"] {
            integer(config, section, key)?;
        }
        for key in ["stop_loss", "take_profit"] {
            risk_definition(config, section, key)?;
        }
    }
    Ok(())
}
