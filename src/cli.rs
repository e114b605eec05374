//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult, RunStatus};
use crate::domain::batch::{run_batch, BacktestJob};
use crate::domain::config_validation::{
    integer, number, require, risk_definition, rule_sections, validate_backtest_config,
    validate_strategy_config, RULE_SECTION_PREFIX,
};
use crate::domain::error::RulebenchError;
use crate::domain::risk::TieBreak;
use crate::domain::strategy::{ActionParameters, RawNumber, RuleDefinition, Strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "rulebench", about = "Rule-driven strategy backtester")]
pub struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy over a bar file
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: PathBuf,
        /// CSV file, or directory of `{symbol}_{timeframe}.csv` files
        #[arg(short, long)]
        data: PathBuf,
        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Validate a strategy file and report every rule issue
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
        /// Run config supplying the instrument tick size
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run several strategies over the same bars in parallel
    Batch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long, required = true)]
        strategy: Vec<PathBuf>,
        /// Directory for one JSON result per strategy
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Dispatch a parsed command line.
pub fn execute(cli: Cli) -> Result<(), RulebenchError> {
    init_tracing(cli.verbose);

    match cli.command {
        Command::Backtest {
            config,
            strategy,
            data,
            output,
            compact,
        } => run_single(
            &config,
            &strategy,
            &CsvAdapter::new(data),
            output.as_deref(),
            compact,
        ),
        Command::Validate { strategy, config } => run_validate(&strategy, config.as_deref()),
        Command::Batch {
            config,
            data,
            strategy,
            output,
        } => run_many(&config, &CsvAdapter::new(data), &strategy, output.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // a second call (tests run the CLI repeatedly) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RulebenchError> {
    FileConfigAdapter::from_file(path).map_err(|e| RulebenchError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Build the run configuration. Keys left out keep their defaults.
pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, RulebenchError> {
    validate_backtest_config(config)?;
    let defaults = BacktestConfig::default();

    let tie_break = match config.get_string("risk", "tie_break") {
        Some(s) => s.parse::<TieBreak>().map_err(|_| RulebenchError::ConfigInvalid {
            section: "risk".into(),
            key: "tie_break".into(),
            reason: format!("unknown tie break '{}'", s.trim()),
        })?,
        None => defaults.tie_break,
    };
    let count = |section: &str, key: &str, default: usize| -> Result<usize, RulebenchError> {
        Ok(integer(config, section, key)?.map_or(default, |v| v.max(1) as usize))
    };

    Ok(BacktestConfig {
        initial_capital: number(config, "backtest", "initial_capital")?
            .unwrap_or(defaults.initial_capital),
        commission_per_trade: number(config, "backtest", "commission_per_trade")?
            .unwrap_or(defaults.commission_per_trade),
        commission_pct: number(config, "backtest", "commission_pct")?
            .unwrap_or(defaults.commission_pct),
        slippage_pct: number(config, "backtest", "slippage_pct")?.unwrap_or(defaults.slippage_pct),
        risk_free_rate: number(config, "backtest", "risk_free_rate")?
            .unwrap_or(defaults.risk_free_rate),
        point_value: number(config, "instrument", "point_value")?.unwrap_or(defaults.point_value),
        tick_size: number(config, "instrument", "tick_size")?,
        atr_period: count("risk", "atr_period", defaults.atr_period)?,
        tie_break,
        sanity_window: count("risk", "sanity_window", defaults.sanity_window)?,
        sanity_factor: number(config, "risk", "sanity_factor")?.unwrap_or(defaults.sanity_factor),
    })
}

fn rank(config: &dyn ConfigPort, section: &str, key: &str) -> Result<i32, RulebenchError> {
    match integer(config, section, key)? {
        None => Ok(0),
        Some(v) => i32::try_from(v).map_err(|_| RulebenchError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} is out of range", v),
        }),
    }
}

/// Build a strategy descriptor from a `[strategy]` section and its
/// `[rule.<name>]` sections. Rule text and amounts are carried through
/// unparsed; operand, operator, size and risk value problems surface when the
/// strategy is compiled.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, RulebenchError> {
    validate_strategy_config(config)?;

    let mut rules = Vec::new();
    for section in rule_sections(config) {
        let name = section
            .strip_prefix(RULE_SECTION_PREFIX)
            .unwrap_or(&section)
            .to_string();
        let text = |key: &str| {
            config
                .get_string(&section, key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        rules.push(RuleDefinition {
            rule_type: require(config, &section, "rule_type")?,
            condition_type: text("condition_type"),
            left_operand: text("left_operand"),
            operator: text("operator"),
            right_operand: text("right_operand"),
            logical_operator: text("logical_operator"),
            action_type: text("action_type"),
            priority: rank(config, &section, "priority")?,
            order: rank(config, &section, "order")?,
            is_active: config.get_bool(&section, "is_active", true),
            parameters: ActionParameters {
                size: text("size").map(|s| RawNumber::from(s.as_str())),
                stop_loss: risk_definition(config, &section, "stop_loss")?,
                take_profit: risk_definition(config, &section, "take_profit")?,
            },
            name,
        });
    }

    Ok(Strategy {
        name: require(config, "strategy", "name")?,
        description: config
            .get_string("strategy", "description")
            .unwrap_or_default(),
        symbol: require(config, "strategy", "symbol")?,
        timeframe: config
            .get_string("strategy", "timeframe")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "1d".to_string()),
        rules,
        stop_loss: risk_definition(config, "strategy", "stop_loss")?,
        take_profit: risk_definition(config, "strategy", "take_profit")?,
        max_positions: integer(config, "strategy", "max_positions")?
            .map_or(1, |v| v.max(1) as usize),
    })
}

/// Load a strategy from `.json` (serde) or INI (anything else).
pub fn load_strategy(path: &Path) -> Result<Strategy, RulebenchError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| RulebenchError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    } else {
        build_strategy(&load_config(path)?)
    }
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== {} on {} ({}) ===", result.strategy, result.symbol, result.timeframe);
    if result.status == RunStatus::Cancelled {
        eprintln!(
            "Cancelled after {} of {} bars",
            result.bars_processed, result.total_bars
        );
    }
    eprintln!("Final Equity:     {:.2}", result.final_equity);
    eprintln!("Total Return:     {:.2}%", m.total_return_pct);
    eprintln!("Annualized:       {:.2}%", m.annualized_return_pct);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);
    eprintln!("Trades / Month:   {:.2}", m.trades_per_month);
    eprintln!("Rating:           {}", m.rating);
    eprintln!("{}", result.summary);
}

fn run_single(
    config_path: &Path,
    strategy_path: &Path,
    data: &dyn DataPort,
    output_path: Option<&Path>,
    compact: bool,
) -> Result<(), RulebenchError> {
    let config = build_backtest_config(&load_config(config_path)?)?;
    let strategy = load_strategy(strategy_path)?.compile(config.tick_size);
    let bars = data.fetch_bars(&strategy.symbol, &strategy.timeframe)?;

    let result = run_backtest(&bars, &strategy, &config, None)?;
    print_summary(&result);

    let report = JsonReportAdapter::new(!compact);
    match output_path {
        Some(path) => {
            report.write(&result, &path.display().to_string())?;
            eprintln!("\nResult written to: {}", path.display());
        }
        None => println!("{}", report.to_json(&result)?),
    }
    Ok(())
}

fn run_validate(strategy_path: &Path, config_path: Option<&Path>) -> Result<(), RulebenchError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let tick_size = match config_path {
        Some(path) => build_backtest_config(&load_config(path)?)?.tick_size,
        None => None,
    };

    let strategy = load_strategy(strategy_path)?;
    let compiled = strategy.compile(tick_size);

    let live = compiled.rules.iter().filter(|r| !r.is_inert()).count();
    eprintln!("\n{} rule(s), {} live", strategy.rules.len(), live);
    for indicator in compiled.indicator_types(BacktestConfig::default().atr_period) {
        eprintln!("  uses {}", indicator);
    }

    if compiled.is_clean() {
        eprintln!("\nStrategy configuration is valid.");
        return Ok(());
    }

    eprintln!("\nIssues:");
    for issue in &compiled.issues {
        eprintln!("  {}", issue);
    }
    Err(RulebenchError::RuleInvalid {
        strategy: compiled.name,
        count: compiled.issues.len(),
    })
}

fn job_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Strategies sharing a symbol and timeframe run as one parallel batch over
/// the same bars.
fn run_many(
    config_path: &Path,
    data: &dyn DataPort,
    strategy_paths: &[PathBuf],
    output_dir: Option<&Path>,
) -> Result<(), RulebenchError> {
    let config = build_backtest_config(&load_config(config_path)?)?;

    let mut groups: BTreeMap<(String, String), Vec<BacktestJob>> = BTreeMap::new();
    for path in strategy_paths {
        let strategy = load_strategy(path)?.compile(config.tick_size);
        let key = (strategy.symbol.clone(), strategy.timeframe.clone());
        groups
            .entry(key)
            .or_default()
            .push(BacktestJob::new(job_label(path), strategy, config.clone()));
    }

    let report = JsonReportAdapter::default();
    let mut first_error = None;
    for ((symbol, timeframe), jobs) in &groups {
        let bars = data.fetch_bars(symbol, timeframe)?;
        let results = run_batch(&bars, jobs, None);

        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(result) => {
                    print_summary(&result);
                    if let Some(dir) = output_dir {
                        let path = dir.join(format!("{}.json", job.label));
                        report.write(&result, &path.display().to_string())?;
                    }
                }
                Err(e) => {
                    eprintln!("\n=== {} failed: {} ===", job.label, e);
                    if first_error.is_none() {
                        first_error = Some(RulebenchError::Backtest(e));
                    }
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
