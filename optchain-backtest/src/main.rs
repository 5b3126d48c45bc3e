//! # Run a single backtest
//! optchain-backtest run --data data/snapshots --config config/default.toml
//!
//! # Override parameters from the command line
//! optchain-backtest run --data data/snapshots --sl 0.25 --rr 2 --side CE
//!
//! # Sweep risk parameters in parallel
//! optchain-backtest sweep --data data/snapshots --sl 0.2,0.3 --rr 1.5,2,3 --top 5

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::warn;

use optchain_backtest::backtest::{export_all, BacktestConfig, BacktestEngine, BacktestError};
use optchain_backtest::data::{load_series, LoaderError, SideSelection};
use optchain_backtest::metrics::MetricsCalculator;
use optchain_backtest::sweep::{ParameterGrid, SweepRunner};

#[derive(Parser)]
#[command(name = "optchain-backtest")]
#[command(about = "Backtest option-chain snapshot series with daily risk controls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory of SYMBOL_YYYYMMDD_HHMMSS.csv snapshots
    #[arg(short, long, default_value = "data/snapshots")]
    data: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Side to trade (AUTO, CE, PE)
    #[arg(long)]
    side: Option<SideSelection>,

    /// Look-ahead window in snapshots (defaults to max trades per day)
    #[arg(long)]
    lookahead: Option<usize>,

    /// Starting balance
    #[arg(long)]
    initial_balance: Option<Decimal>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Stop-loss fraction of the entry price
        #[arg(long)]
        sl: Option<f64>,

        /// Reward-to-risk ratio
        #[arg(long)]
        rr: Option<f64>,

        /// Fraction of the balance risked per trade
        #[arg(long)]
        risk: Option<f64>,

        /// Maximum trades per day
        #[arg(long)]
        max_trades: Option<usize>,

        /// Output directory for reports (defaults to the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip writing report files
        #[arg(long)]
        no_export: bool,

        /// Print the trade PnL histogram
        #[arg(long)]
        histogram: bool,
    },

    /// Run a parameter sweep
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// Stop-loss fractions, comma separated
        #[arg(long, default_value = "0.2,0.3,0.4")]
        sl: String,

        /// Reward-to-risk ratios, comma separated
        #[arg(long, default_value = "1.5,2,3")]
        rr: String,

        /// Risk fractions, comma separated
        #[arg(long, default_value = "0.01,0.02")]
        risk: String,

        /// Daily trade caps, comma separated
        #[arg(long, default_value = "2,3,5")]
        max_trades: String,

        /// Number of ranked results to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn parse_list<T: FromStr>(raw: &str, name: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .with_context(|| format!("Invalid value '{}' for --{}", s, name))
        })
        .collect()
}

fn base_config(common: &CommonArgs) -> Result<BacktestConfig> {
    let mut config = match &common.config {
        Some(path) => BacktestConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BacktestConfig::default(),
    };

    if let Some(side) = common.side {
        config.side = side;
    }
    if let Some(window) = common.lookahead {
        config.lookahead_window = Some(window);
    }
    if let Some(balance) = common.initial_balance {
        config.initial_balance = balance;
    }
    Ok(config)
}

fn no_data(dir: &str) {
    warn!("No snapshot files found in {}", dir);
    println!("No trades executed.");
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    common: CommonArgs,
    sl: Option<f64>,
    rr: Option<f64>,
    risk: Option<f64>,
    max_trades: Option<usize>,
    output: Option<PathBuf>,
    no_export: bool,
    histogram: bool,
) -> Result<()> {
    let mut config = base_config(&common)?;
    if let Some(v) = sl {
        config.stop_loss_fraction = v;
    }
    if let Some(v) = rr {
        config.reward_ratio = v;
    }
    if let Some(v) = risk {
        config.risk_fraction = v;
    }
    if let Some(v) = max_trades {
        config.max_trades_per_day = v;
    }
    config.validate().context("Invalid backtest parameters")?;

    let engine = BacktestEngine::new(config);
    let result = match engine.run(&common.data) {
        Ok(result) => result,
        Err(BacktestError::Loader(LoaderError::NotFound(dir))) => {
            no_data(&dir);
            return Ok(());
        }
        Err(e) => return Err(e).context("Backtest failed"),
    };

    if result.trades().is_empty() {
        println!("No trades executed.");
        return Ok(());
    }

    println!("{}", result.summary());

    if histogram {
        println!("\nPnL distribution:");
        for bin in MetricsCalculator::pnl_histogram(result.trades(), 30) {
            println!("{:>12.2} .. {:>12.2} | {}", bin.lower, bin.upper, "#".repeat(bin.count));
        }
    }

    if !no_export {
        let out_dir: &Path = output.as_deref().unwrap_or(common.data.as_path());
        let paths = export_all(&result, out_dir).context("Failed to write reports")?;
        println!("\nTrades: {}", paths.trades.display());
        println!("Daily summary: {}", paths.daily.display());
        println!("Metrics: {}", paths.metrics.display());
    }

    Ok(())
}

fn cmd_sweep(common: CommonArgs, grid: ParameterGrid, top: usize) -> Result<()> {
    let config = base_config(&common)?;

    let series = match load_series(&common.data) {
        Ok(series) => series,
        Err(LoaderError::NotFound(dir)) => {
            no_data(&dir);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to load snapshots"),
    };

    let results = SweepRunner::new(config).with_param_grid(grid).run(&series);
    if results.is_empty() {
        println!("No valid parameter combinations.");
        return Ok(());
    }

    println!("Top {} of {} combinations:", top.min(results.len()), results.len());
    for result in results.iter().take(top) {
        println!("{}", result.line());
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("optchain_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            sl,
            rr,
            risk,
            max_trades,
            output,
            no_export,
            histogram,
        } => cmd_run(common, sl, rr, risk, max_trades, output, no_export, histogram)?,
        Commands::Sweep {
            common,
            sl,
            rr,
            risk,
            max_trades,
            top,
        } => {
            let grid = ParameterGrid {
                stop_loss_fraction: parse_list(&sl, "sl")?,
                reward_ratio: parse_list(&rr, "rr")?,
                risk_fraction: parse_list(&risk, "risk")?,
                max_trades_per_day: parse_list(&max_trades, "max-trades")?,
            };
            cmd_sweep(common, grid, top)?;
        }
    }

    Ok(())
}
