//! JSON report adapter implementing ReportPort.
//!
//! The report is the serialized [`BacktestResult`]. Field order follows the
//! struct declarations, so the same result always produces the same bytes.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RulebenchError;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter {
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn to_json(&self, result: &BacktestResult) -> Result<String, RulebenchError> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(result)
        } else {
            serde_json::to_string(result)
        };
        rendered.map_err(|e| RulebenchError::Io(std::io::Error::other(e)))
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), RulebenchError> {
        let mut json = self.to_json(result)?;
        json.push('\n');

        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output_path, json)?;
        tracing::info!(path = output_path, "report written");
        Ok(())
    }
}
