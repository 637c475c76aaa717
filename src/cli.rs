//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use crate::adapters::csv_adapter::{read_feature_table, write_ledger_csv, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::TextReportAdapter;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestReport};
use crate::domain::config_validation::{validate_backtest_config, validate_strategy_config};
use crate::domain::error::ChaintraderError;
use crate::domain::feature::{parse_timestamp, FeatureTable};
use crate::domain::feature_builder::build_features;
use crate::domain::strategy::{
    MovingAverageCross, NetworkMetricsThreshold, SignalColumn, Strategy, ZScoreThreshold,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataProvider;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "chaintrader", about = "Signal-driven crypto strategy backtester")]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Report file; overrides [report] output
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate and print the resolved setup without running
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data range of the configured source
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    crate::logging::init(cli.verbose);

    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest_command(&config, output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ChaintraderError> {
    info!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Relative paths in a config file resolve against the file's directory.
fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let value = Path::new(value.trim());
    if value.is_absolute() {
        return value.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(value))
        .unwrap_or_else(|| value.to_path_buf())
}

fn config_date(
    adapter: &dyn ConfigPort,
    key: &str,
    end_of_day: bool,
) -> Result<Option<NaiveDateTime>, ChaintraderError> {
    let Some(raw) = adapter.get_string("backtest", key) else {
        return Ok(None);
    };
    let invalid = || ChaintraderError::ConfigInvalid {
        section: "backtest".into(),
        key: key.into(),
        reason: "invalid date format (expected YYYY-MM-DD)".into(),
    };

    // A bare date as an upper bound covers the whole day.
    if end_of_day {
        if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            return date.and_hms_opt(23, 59, 59).map(Some).ok_or_else(invalid);
        }
    }
    parse_timestamp(&raw).map(Some).ok_or_else(invalid)
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, ChaintraderError> {
    let defaults = BacktestConfig::default();

    let initial_capital = adapter
        .get_string("backtest", "initial_capital")
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| ChaintraderError::ConfigMissing {
            section: "backtest".into(),
            key: "initial_capital".into(),
        })?;

    Ok(BacktestConfig {
        symbol: adapter
            .get_string("backtest", "symbol")
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.symbol),
        initial_capital,
        commission_rate: adapter.get_double("backtest", "commission_rate", defaults.commission_rate),
        max_position_pct: adapter.get_double(
            "backtest",
            "max_position_pct",
            defaults.max_position_pct,
        ),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        start: config_date(adapter, "start_date", false)?,
        end: config_date(adapter, "end_date", true)?,
    })
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Box<dyn Strategy>, ChaintraderError> {
    let name = adapter
        .get_string("strategy", "type")
        .map(|s| s.trim().to_lowercase())
        .ok_or_else(|| ChaintraderError::ConfigMissing {
            section: "strategy".into(),
            key: "type".into(),
        })?;

    let window = |key: &str, default: usize| {
        adapter.get_int("strategy", key, default as i64).max(1) as usize
    };
    let size = |default: f64| adapter.get_double("strategy", "position_size", default);

    let strategy: Box<dyn Strategy> = match name.as_str() {
        "ma_cross" => {
            let d = MovingAverageCross::default();
            Box::new(MovingAverageCross {
                fast_window: window("fast_window", d.fast_window),
                slow_window: window("slow_window", d.slow_window),
                position_size: size(d.position_size),
            })
        }
        "network_metrics" => {
            let d = NetworkMetricsThreshold::default();
            Box::new(NetworkMetricsThreshold {
                address_threshold: adapter.get_double(
                    "strategy",
                    "address_threshold",
                    d.address_threshold,
                ),
                velocity_threshold: adapter.get_double(
                    "strategy",
                    "velocity_threshold",
                    d.velocity_threshold,
                ),
                hash_rate_threshold: adapter.get_double(
                    "strategy",
                    "hash_rate_threshold",
                    d.hash_rate_threshold,
                ),
                position_size: size(d.position_size),
            })
        }
        "signal_column" => Box::new(SignalColumn {
            position_size: size(SignalColumn::default().position_size),
        }),
        "zscore" => {
            let d = ZScoreThreshold::default();
            Box::new(ZScoreThreshold {
                column: adapter
                    .get_string("strategy", "zscore_column")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(d.column),
                window: window("zscore_window", d.window),
                threshold: adapter.get_double("strategy", "zscore_threshold", d.threshold),
                position_size: size(d.position_size),
            })
        }
        _ => return Err(ChaintraderError::UnknownStrategy { name }),
    };
    Ok(strategy)
}

/// Feature table from either `features_path` or the raw series in `data_dir`.
pub fn load_features(
    adapter: &dyn ConfigPort,
    config_path: &Path,
    symbol: &str,
) -> Result<FeatureTable, ChaintraderError> {
    let configured = |key: &str| {
        adapter
            .get_string("backtest", key)
            .filter(|s| !s.trim().is_empty())
    };

    if let Some(features_path) = configured("features_path") {
        let path = resolve_path(config_path, &features_path);
        info!("Reading feature table {}", path.display());
        return read_feature_table(&path);
    }

    let data_dir = configured("data_dir")
        .ok_or_else(|| ChaintraderError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        })?;
    let dir = resolve_path(config_path, &data_dir);
    info!("Loading {} series from {}", symbol, dir.display());

    let raw = CsvAdapter::new(dir).load_market_data(symbol)?;
    Ok(build_features(&raw))
}

/// Validate `adapter` and run the backtest it describes.
pub fn execute_backtest(
    adapter: &dyn ConfigPort,
    config_path: &Path,
) -> Result<BacktestReport, ChaintraderError> {
    validate_backtest_config(adapter)?;
    validate_strategy_config(adapter)?;

    let bt_config = build_backtest_config(adapter)?;
    let strategy = build_strategy(adapter)?;
    info!("Strategy: {}", strategy.name());

    let features = load_features(adapter, config_path, &bt_config.symbol)?;
    run_backtest(&features, strategy.as_ref(), &bt_config)
}

fn run_backtest_command(config_path: &Path, output: Option<&Path>) -> Result<(), ChaintraderError> {
    let adapter = load_config(config_path)?;
    let report = execute_backtest(&adapter, config_path)?;

    if adapter.get_bool("report", "print_trades", false) {
        print!("{}", TextReportAdapter::render(&report));
    } else {
        print!("{}", report.render_text());
    }

    let output = output.map(Path::to_path_buf).or_else(|| {
        adapter
            .get_string("report", "output")
            .map(|p| resolve_path(config_path, &p))
    });
    if let Some(output) = output {
        TextReportAdapter::new().write(&report, &output)?;
        info!("Report written to: {}", output.display());
    }

    if let Some(ledger_csv) = adapter.get_string("report", "ledger_csv") {
        let path = resolve_path(config_path, &ledger_csv);
        write_ledger_csv(&report.ledger, &path)?;
        info!("Ledger written to: {}", path.display());
    }

    Ok(())
}

pub fn run_dry_run(config_path: &Path) -> Result<(), ChaintraderError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    info!("Config validated successfully");

    let bt_config = build_backtest_config(&adapter)?;
    let strategy = build_strategy(&adapter)?;

    let bound = |b: Option<NaiveDateTime>| b.map_or_else(|| "open".to_string(), |t| t.to_string());
    println!("Symbol:           {}", bt_config.symbol);
    println!("Strategy:         {}", strategy.name());
    println!("Initial capital:  {}", bt_config.initial_capital);
    println!("Commission rate:  {}", bt_config.commission_rate);
    println!("Max position pct: {}", bt_config.max_position_pct);
    println!("Risk-free rate:   {}", bt_config.risk_free_rate);
    println!("Start:            {}", bound(bt_config.start));
    println!("End:              {}", bound(bt_config.end));
    println!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), ChaintraderError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    build_strategy(&adapter)?;
    println!("Configuration is valid.");
    Ok(())
}

fn run_info(config_path: &Path) -> Result<(), ChaintraderError> {
    let adapter = load_config(config_path)?;
    let symbol = build_backtest_config(&adapter)
        .map(|c| c.symbol)
        .unwrap_or_else(|_| BacktestConfig::default().symbol);

    if let Some(data_dir) = adapter.get_string("backtest", "data_dir") {
        let provider = CsvAdapter::new(resolve_path(config_path, &data_dir));
        match provider.get_data_range(&symbol)? {
            Some((first, last, count)) => {
                println!("{}: {} prices, {} to {}", symbol, count, first, last);
            }
            None => println!("{}: no data found", symbol),
        }
        return Ok(());
    }

    let table = load_features(&adapter, config_path, &symbol)?;
    match (table.first_timestamp(), table.last_timestamp()) {
        (Some(first), Some(last)) => {
            println!("{}: {} rows, {} to {}", symbol, table.len(), first, last);
        }
        _ => println!("{}: no data found", symbol),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn backtest_config_defaults() {
        let cfg = build_backtest_config(&adapter("[backtest]\ninitial_capital = 5000\n")).unwrap();
        assert_eq!(cfg.symbol, "BTC");
        assert_eq!(cfg.initial_capital, 5000.0);
        assert_eq!(cfg.risk_free_rate, 0.02);
        assert_eq!(cfg.max_position_pct, 1.0);
        assert!(cfg.start.is_none() && cfg.end.is_none());
    }

    #[test]
    fn end_date_covers_whole_day() {
        let cfg = build_backtest_config(&adapter(
            "[backtest]\ninitial_capital = 1\nstart_date = 2024-01-01\nend_date = 2024-01-31\n",
        ))
        .unwrap();
        assert_eq!(cfg.start.unwrap().to_string(), "2024-01-01 00:00:00");
        assert_eq!(cfg.end.unwrap().to_string(), "2024-01-31 23:59:59");
    }

    #[test]
    fn symbol_is_uppercased() {
        let cfg = build_backtest_config(&adapter("[backtest]\ninitial_capital = 1\nsymbol = eth\n"))
            .unwrap();
        assert_eq!(cfg.symbol, "ETH");
    }

    #[test]
    fn missing_capital_is_config_error() {
        let err = build_backtest_config(&adapter("[backtest]\nsymbol = BTC\n")).unwrap_err();
        assert!(matches!(err, ChaintraderError::ConfigMissing { .. }));
    }

    #[test]
    fn builds_each_strategy() {
        for (name, expected) in [
            ("ma_cross", "ma_cross"),
            ("Network_Metrics", "network_metrics"),
            ("signal_column", "signal_column"),
            ("zscore", "zscore"),
        ] {
            let strategy = build_strategy(&adapter(&format!("[strategy]\ntype = {name}\n"))).unwrap();
            assert_eq!(strategy.name(), expected);
        }
    }

    #[test]
    fn unknown_strategy() {
        let err = build_strategy(&adapter("[strategy]\ntype = grid\n"))
            .err()
            .unwrap();
        assert!(matches!(err, ChaintraderError::UnknownStrategy { .. }));
    }

    #[test]
    fn resolve_path_relative_to_config() {
        let resolved = resolve_path(Path::new("/etc/chaintrader/config.ini"), "data");
        assert_eq!(resolved, PathBuf::from("/etc/chaintrader/data"));
        let absolute = resolve_path(Path::new("/etc/config.ini"), "/var/data");
        assert_eq!(absolute, PathBuf::from("/var/data"));
    }

    #[test]
    fn cli_parses_global_verbose() {
        let cli = Cli::try_parse_from(["chaintrader", "-v", "validate", "-c", "x.ini"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Validate { .. }));
    }
}
