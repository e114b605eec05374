//! CLI integration tests.
//!
//! Tests cover:
//! - Config and strategy loading from INI and JSON files on disk
//! - `backtest` end to end with a CSV file and JSON output
//! - `validate` exit codes for clean and broken strategies
//! - `batch` writing one result per strategy
//! - Exit codes for configuration, data and integrity failures

mod common;

use clap::Parser;
use common::*;
use rulebench::cli::{self, Cli};
use rulebench::domain::backtest::{BacktestResult, RunStatus};
use rulebench::domain::error::RulebenchError;
use rulebench::domain::position::ExitReason;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Exit status the binary would report.
fn run_cli(args: &[&str]) -> u8 {
    let mut argv = vec!["rulebench"];
    argv.extend_from_slice(args);
    match cli::execute(Cli::try_parse_from(argv).unwrap()) {
        Ok(()) => 0,
        Err(e) => e.exit_status(),
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn read_result(path: &Path) -> BacktestResult {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

mod loading {
    use super::*;

    #[test]
    fn strategy_loads_from_ini() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let strategy = cli::load_strategy(&path).unwrap();
        assert_eq!(strategy.name, "Spike");
        assert_eq!(strategy.rules.len(), 2);
        assert_eq!(strategy.rules[0].name, "a_spike");
        assert_eq!(strategy.take_profit.as_ref().unwrap().kind, "percentage");
    }

    #[test]
    fn strategy_loads_from_json() {
        let dir = TempDir::new().unwrap();
        let json = serde_json::to_string_pretty(&spike_strategy()).unwrap();
        let path = write_file(&dir, "spike.json", &json);
        let strategy = cli::load_strategy(&path).unwrap();
        assert_eq!(strategy, spike_strategy());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "broken.json", "{\"name\": ");
        let err = cli::load_strategy(&path).unwrap_err();
        assert!(matches!(err, RulebenchError::ConfigParse { .. }));
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn run_config_loads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "run.ini", RUN_INI);
        let adapter = cli::load_config(&path).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.initial_capital, 100_000.0);
        assert_eq!(config.atr_period, 14);
        assert_eq!(config.tick_size, None);
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let err = cli::load_config(Path::new("/nonexistent/run.ini")).unwrap_err();
        assert!(matches!(err, RulebenchError::ConfigParse { .. }));
        assert_eq!(err.exit_status(), 2);
    }

    #[test]
    fn loaded_config_is_debug_printable() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "run.ini", RUN_INI);
        let adapter = cli::load_config(&path).unwrap();
        assert!(format!("{adapter:?}").contains("FileConfigAdapter"));
    }

    #[test]
    fn malformed_rule_risk_value_still_loads() {
        let dir = TempDir::new().unwrap();
        let ini = SPIKE_STRATEGY_INI.replace(
            "action_type = buy",
            "action_type = buy\nstop_loss = percentage:abc",
        );
        let path = write_file(&dir, "broken.ini", &ini);
        let strategy = cli::load_strategy(&path).unwrap();
        let compiled = strategy.compile(None);
        assert_eq!(compiled.issues.len(), 1);
        assert!(!compiled.rules[0].is_inert());
        assert!(compiled.rules[1].is_inert());
    }

    #[test]
    fn quoted_json_risk_value_still_loads() {
        let dir = TempDir::new().unwrap();
        let mut value = serde_json::to_value(spike_strategy()).unwrap();
        value["stop_loss"]["value"] = serde_json::json!("abc");
        let path = write_file(&dir, "broken.json", &value.to_string());
        let strategy = cli::load_strategy(&path).unwrap();
        let compiled = strategy.compile(None);
        assert_eq!(compiled.issues.len(), 1);
        assert!(compiled.rules.iter().all(|r| !r.is_inert()));
    }
}

mod backtest_command {
    use super::*;

    #[test]
    fn spike_backtest_writes_json_result() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let data = write_file(&dir, "TEST_1d.csv", &spike_csv());
        let output = dir.path().join("out/result.json");

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(&data),
            "-o",
            arg(&output),
        ]);
        assert_eq!(code, 0);

        let result = read_result(&output);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].entry_price, 150.0);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        assert!((result.trades[0].exit_price - 142.5).abs() < 1e-9);
    }

    #[test]
    fn data_directory_resolves_symbol_file() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let bars = dir.path().join("bars");
        fs::create_dir(&bars).unwrap();
        fs::write(bars.join("TEST_1d.csv"), spike_csv()).unwrap();
        let output = dir.path().join("result.json");

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(&bars),
            "-o",
            arg(&output),
        ]);
        assert_eq!(code, 0);
        assert_eq!(read_result(&output).trades.len(), 1);
    }

    #[test]
    fn data_directory_without_symbol_file_exits_3() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        write_file(&dir, "OTHER_1d.csv", &spike_csv());

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(dir.path()),
        ]);
        assert_eq!(code, 3);
    }

    #[test]
    fn repeated_runs_write_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let data = write_file(&dir, "bars.csv", &spike_csv());
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");

        for output in [&first, &second] {
            let code = run_cli(&[
                "backtest",
                "-c",
                arg(&config),
                "-s",
                arg(&strategy),
                "-d",
                arg(&data),
                "-o",
                arg(output),
            ]);
            assert_eq!(code, 0);
        }
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn invalid_run_config_exits_2() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", "[backtest]\ninitial_capital = -5\n");
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let data = write_file(&dir, "bars.csv", &spike_csv());

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(&data),
        ]);
        assert_eq!(code, 2);
    }

    #[test]
    fn missing_data_file_exits_3() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let data = dir.path().join("absent.csv");

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(&data),
        ]);
        assert_eq!(code, 3);
    }

    #[test]
    fn unordered_bars_exit_5() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let data = write_file(
            &dir,
            "bars.csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-02,100,100,100,100,1\n\
             2024-01-01,100,100,100,100,1\n",
        );

        let code = run_cli(&[
            "backtest",
            "-c",
            arg(&config),
            "-s",
            arg(&strategy),
            "-d",
            arg(&data),
        ]);
        assert_eq!(code, 5);
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn clean_strategy_exits_0() {
        let dir = TempDir::new().unwrap();
        let strategy = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        assert_eq!(run_cli(&["validate", "-s", arg(&strategy)]), 0);
    }

    #[test]
    fn unknown_operand_exits_4() {
        let dir = TempDir::new().unwrap();
        let broken = SPIKE_STRATEGY_INI.replace("left_operand = price", "left_operand = sma_x");
        let strategy = write_file(&dir, "broken.ini", &broken);
        assert_eq!(run_cli(&["validate", "-s", arg(&strategy)]), 4);
    }

    #[test]
    fn ticks_need_tick_size_from_config() {
        let dir = TempDir::new().unwrap();
        let ticks = SPIKE_STRATEGY_INI.replace("stop_loss = percentage:5", "stop_loss = ticks:8");
        let strategy = write_file(&dir, "ticks.ini", &ticks);
        assert_eq!(run_cli(&["validate", "-s", arg(&strategy)]), 4);

        let config = write_file(&dir, "run.ini", "[instrument]\ntick_size = 0.25\n");
        assert_eq!(
            run_cli(&["validate", "-s", arg(&strategy), "-c", arg(&config)]),
            0
        );
    }

    #[test]
    fn malformed_risk_value_exits_4() {
        let dir = TempDir::new().unwrap();
        let broken = SPIKE_STRATEGY_INI.replace(
            "action_type = buy",
            "action_type = buy\nstop_loss = percentage:abc",
        );
        let strategy = write_file(&dir, "broken.ini", &broken);
        assert_eq!(run_cli(&["validate", "-s", arg(&strategy)]), 4);
    }

    #[test]
    fn missing_rule_type_exits_2() {
        let dir = TempDir::new().unwrap();
        let strategy = write_file(
            &dir,
            "bad.ini",
            "[strategy]\nname = A\nsymbol = X\n[rule.a]\nleft_operand = close\n",
        );
        assert_eq!(run_cli(&["validate", "-s", arg(&strategy)]), 2);
    }
}

mod batch_command {
    use super::*;

    #[test]
    fn writes_one_result_per_strategy() {
        let dir = TempDir::new().unwrap();
        let config = write_file(&dir, "run.ini", RUN_INI);
        let data = write_file(&dir, "bars.csv", &spike_csv());
        let ini = write_file(&dir, "spike.ini", SPIKE_STRATEGY_INI);
        let json = write_file(
            &dir,
            "cross.json",
            &serde_json::to_string(&sma_cross_strategy()).unwrap(),
        );
        let out = dir.path().join("results");

        let code = run_cli(&[
            "batch",
            "-c",
            arg(&config),
            "-d",
            arg(&data),
            "-s",
            arg(&ini),
            "-s",
            arg(&json),
            "-o",
            arg(&out),
        ]);
        assert_eq!(code, 0);

        let spike = read_result(&out.join("spike.json"));
        assert_eq!(spike.strategy, "Spike");
        assert_eq!(spike.trades.len(), 1);
        let cross = read_result(&out.join("cross.json"));
        assert_eq!(cross.strategy, "SMA Cross");
        assert_eq!(cross.total_bars, 100);
    }
}
