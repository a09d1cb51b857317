//! MACD Backtest CLI
//!
//! # Usage
//!
//! ```bash
//! # Run a single backtest
//! macd-backtest run --data data/spy.csv --start 2020-01-01 --end 2023-12-31
//!
//! # Custom parameters and configuration
//! macd-backtest run --data data/spy.csv --start 2020-01-01 --end 2023-12-31 \
//!     --params '{"short_ema": 8, "long_ema": 21, "signal_ema": 5}' --config config/default.toml
//!
//! # Sweep a parameter grid
//! macd-backtest sweep --data data/spy.csv --start 2020-01-01 --end 2023-12-31 \
//!     --short 5,8,12 --long 20,26 --signal 9
//!
//! # Export indicator series for plotting
//! macd-backtest chart --data data/spy.csv --start 2020-01-01 --end 2023-12-31 --output chart.json
//!
//! # Check a price file
//! macd-backtest validate --data data/spy.csv
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use macd_backtest::config::RunConfig;
use macd_backtest::data::load_csv;
use macd_backtest::pipeline::{load_range, MacdBacktest};
use macd_backtest::strategy::{ExitPolicy, StrategyParams};
use macd_backtest::sweep::{ParameterGrid, ParameterSweep};
use macd_backtest::validation::DataIntegrityValidator;

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "macd-backtest")]
#[command(about = "MACD crossover backtesting engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Price file and date range shared by the backtest commands.
#[derive(Args)]
struct DataArgs {
    /// Path to CSV price file (date, open, high, low, close, volume)
    #[arg(short, long)]
    data: PathBuf,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Starting cash (overrides the configuration file)
    #[arg(long)]
    cash: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest
    Run {
        #[command(flatten)]
        data: DataArgs,

        /// Strategy parameters as JSON, e.g. '{"short_ema": 12, "long_ema": 26, "signal_ema": 9}'
        #[arg(short, long)]
        params: Option<String>,

        /// Close any open position on the last bar
        #[arg(long)]
        close_at_end: bool,

        /// Bearish crossovers only close longs (never go short)
        #[arg(long)]
        flatten_only: bool,

        /// Write the full JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sweep a grid of MACD periods in parallel
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        /// Comma-separated short EMA periods
        #[arg(long, value_delimiter = ',', default_value = "5,8,12")]
        short: Vec<usize>,

        /// Comma-separated long EMA periods
        #[arg(long, value_delimiter = ',', default_value = "20,26,35")]
        long: Vec<usize>,

        /// Comma-separated signal EMA periods
        #[arg(long, value_delimiter = ',', default_value = "5,9")]
        signal: Vec<usize>,

        /// Number of ranked results to print
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write all ranked results as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export price, MACD and crossover series as JSON for plotting
    Chart {
        #[command(flatten)]
        data: DataArgs,

        /// Strategy parameters as JSON
        #[arg(short, long)]
        params: Option<String>,

        /// Output JSON file
        #[arg(short, long, default_value = "chart.json")]
        output: PathBuf,
    },

    /// Check a price file for integrity problems
    Validate {
        /// Path to CSV price file
        #[arg(short, long)]
        data: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("macd_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            params,
            close_at_end,
            flatten_only,
            output,
        } => {
            let mut config = load_config(&data)?;
            if let Some(json) = params {
                config.params = StrategyParams::from_json(&json)?;
            }
            if close_at_end {
                config.simulator.close_at_end = true;
            }
            if flatten_only {
                config.simulator.exit_policy = ExitPolicy::FlattenOnly;
            }
            cmd_run(&data, &config, output.as_deref())?;
        }
        Commands::Sweep {
            data,
            short,
            long,
            signal,
            top,
            output,
        } => {
            let config = load_config(&data)?;
            let grid = ParameterGrid {
                short_ema: short,
                long_ema: long,
                signal_ema: signal,
            };
            cmd_sweep(&data, &config, &grid, top, output.as_deref())?;
        }
        Commands::Chart {
            data,
            params,
            output,
        } => {
            let mut config = load_config(&data)?;
            if let Some(json) = params {
                config.params = StrategyParams::from_json(&json)?;
            }
            cmd_chart(&data, &config, &output)?;
        }
        Commands::Validate { data } => {
            cmd_validate(&data)?;
        }
    }

    Ok(())
}

/// Configuration file (or defaults) with command-line overrides applied.
fn load_config(args: &DataArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(cash) = args.cash {
        config.starting_cash = cash;
    }
    config.validate()?;
    Ok(config)
}

fn load_series(args: &DataArgs) -> Result<macd_backtest::PriceSeries> {
    let start = NaiveDate::parse_from_str(&args.start, "%Y-%m-%d")
        .context("Invalid start date format")?;
    let end =
        NaiveDate::parse_from_str(&args.end, "%Y-%m-%d").context("Invalid end date format")?;
    load_range(&args.data, start, end)
        .with_context(|| format!("Failed to load {}", args.data.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_run(args: &DataArgs, config: &RunConfig, output: Option<&Path>) -> Result<()> {
    let series = load_series(args)?;
    let backtest = MacdBacktest::from_config(config)?;
    let result = backtest.run(&series, &config.params)?;

    println!("{}", SEPARATOR);
    println!("{}", result.summary());
    println!("{}", SEPARATOR);

    if let Some(path) = output {
        write_json(path, &result)?;
    }
    Ok(())
}

fn cmd_sweep(
    args: &DataArgs,
    config: &RunConfig,
    grid: &ParameterGrid,
    top: usize,
    output: Option<&Path>,
) -> Result<()> {
    let series = load_series(args)?;
    let sweep = ParameterSweep::new(MacdBacktest::from_config(config)?);
    let result = sweep.run(&series, grid)?;

    println!("{}", SEPARATOR);
    print!("{}", result.summary(top));
    println!("{}", SEPARATOR);

    if let Some(path) = output {
        write_json(path, &result)?;
    }
    Ok(())
}

fn cmd_chart(args: &DataArgs, config: &RunConfig, output: &Path) -> Result<()> {
    let series = load_series(args)?;
    let chart = MacdBacktest::chart_data(&series, &config.params)?;
    println!(
        "{} bars, {} crossovers ({})",
        chart.bars.len(),
        chart.crossovers.len(),
        config.params.key()
    );
    write_json(output, &chart)
}

fn cmd_validate(data: &Path) -> Result<()> {
    let series = load_csv(data).with_context(|| format!("Failed to load {}", data.display()))?;
    let report = DataIntegrityValidator::validate(&series);

    println!("{}", SEPARATOR);
    println!("{}", report.summary());
    println!("{}", SEPARATOR);

    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("[{}] {}: {}", status, check.name, check.message);
        if let Some(details) = &check.details {
            println!("       {}", details);
        }
        if !check.passed {
            warn!("Integrity check {} failed: {}", check.name, check.message);
        }
    }
    Ok(())
}
