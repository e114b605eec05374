//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[backtest]
initial_capital = 100000.0
commission_per_trade = 10

[strategy]
name = Spike Chaser
max_positions = 2
stop_loss = percentage:5
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("Spike Chaser".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "stop_loss"),
            Some("percentage:5".to_string())
        );
        assert_eq!(adapter.get_int("strategy", "max_positions", 1), 2);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 100\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[risk]\natr_period = abc\n").unwrap();
        assert_eq!(adapter.get_int("risk", "atr_period", 14), 14);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[instrument]\ntick_size = 0.25\n").unwrap();
        assert_eq!(adapter.get_double("instrument", "tick_size", 0.0), 0.25);
        assert_eq!(adapter.get_double("instrument", "point_value", 1.0), 1.0);
    }

    #[test]
    fn get_bool_values() {
        let adapter =
            FileConfigAdapter::from_string("[rule.a]\nis_active = no\n[rule.b]\nis_active = yes\n")
                .unwrap();
        assert!(!adapter.get_bool("rule.a", "is_active", true));
        assert!(adapter.get_bool("rule.b", "is_active", false));
        assert!(adapter.get_bool("rule.c", "is_active", true));
    }

    #[test]
    fn operator_symbols_survive_as_values() {
        let adapter =
            FileConfigAdapter::from_string("[rule.a]\noperator = >=\nright_operand = SMA(20)\n")
                .unwrap();
        assert_eq!(adapter.get_string("rule.a", "operator"), Some(">=".to_string()));
        assert_eq!(
            adapter.get_string("rule.a", "right_operand"),
            Some("SMA(20)".to_string())
        );
    }

    #[test]
    fn sections_lists_rule_sections() {
        let adapter = FileConfigAdapter::from_string(
            "[strategy]\nname = x\n\
             [rule.enter]\nrule_type = action\n\
             [rule.cond]\nrule_type = condition\n",
        )
        .unwrap();
        let mut sections = adapter.sections();
        sections.retain(|s| s != "default");
        sections.sort();
        assert_eq!(sections, vec!["rule.cond", "rule.enter", "strategy"]);
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[instrument]\npoint_value = 50\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_double("instrument", "point_value", 1.0), 50.0);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
