//! CSV file data adapter.
//!
//! The adapter points either at one CSV file, served for every symbol, or at a
//! directory of files named `{symbol}_{timeframe}.csv`. Files carry the header
//! `timestamp,open,high,low,close,volume`. Rows are returned in file order.

use crate::domain::error::RulebenchError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        if self.base_path.is_dir() {
            self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
        } else {
            self.base_path.clone()
        }
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str, timeframe: &str) -> Result<Vec<Bar>, RulebenchError> {
        read_bars(self.csv_path(symbol, timeframe))
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read every bar from one CSV file.
pub fn read_bars<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>, RulebenchError> {
    let path = path.as_ref();
    let source_name = path.display().to_string();
    let data_error = |reason: String| RulebenchError::Data {
        source_name: source_name.clone(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| data_error(format!("failed to open: {}", e)))?;

    let mut bars = Vec::new();
    for (row, result) in rdr.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = result.map_err(|e| data_error(format!("line {}: {}", line, e)))?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            data_error(format!(
                "line {}: invalid timestamp '{}'",
                line, record.timestamp
            ))
        })?;
        bars.push(Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    tracing::debug!(source = %source_name, bars = bars.len(), "loaded bars");
    Ok(bars)
}
