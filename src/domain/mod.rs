//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod indicator;
pub mod risk;
pub mod rule;
pub mod rule_parser;
pub mod snapshot;
pub mod rule_eval;
pub mod backtest;
pub mod batch;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod error;
