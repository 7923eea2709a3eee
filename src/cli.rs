//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::fallback_data_adapter::FallbackBarSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::strategy_dir_adapter::{read_definitions, StrategyDirRepository};
use crate::domain::backtest::{BacktestReport, Engine};
use crate::domain::config_validation::{load_engine_config, EngineConfig};
use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorLibrary;
use crate::domain::metrics::{self, Metrics};
use crate::domain::registry;
use crate::domain::strategy::StrategyDefinition;
use crate::domain::validator;
use crate::ports::data_port::BarSource;
use crate::ports::strategy_repository::StrategyRepository;

#[derive(Parser, Debug)]
#[command(name = "stratforge", about = "Declarative strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every configured strategy and the weighted portfolio
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Validate config and definitions without loading bars
        #[arg(long)]
        dry_run: bool,
        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate a strategy definition file against canonical data
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List symbols available in the configured data directories
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            dry_run,
            json,
        } => run_backtest(&config, dry_run, json),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(err: &EngineError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<EngineConfig, EngineError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    load_engine_config(&adapter)
}

/// Load and validate every definition from the configured directories.
pub fn load_definitions(config: &EngineConfig) -> Result<Vec<StrategyDefinition>, EngineError> {
    let repositories: Vec<StrategyDirRepository> = config
        .strategy_dirs
        .iter()
        .cloned()
        .map(StrategyDirRepository::new)
        .collect();
    let sources: Vec<&dyn StrategyRepository> = repositories
        .iter()
        .map(|r| r as &dyn StrategyRepository)
        .collect();

    let report = registry::load(&sources)?;
    for (id, err) in &report.rejected {
        eprintln!("warning: skipping strategy '{}': {}", id, err);
    }
    Ok(report.definitions.into_values().collect())
}

pub fn bar_source(config: &EngineConfig) -> FallbackBarSource {
    FallbackBarSource::new(
        config
            .data_dirs
            .iter()
            .cloned()
            .map(|dir| Box::new(CsvBarAdapter::new(dir)) as Box<dyn BarSource + Send + Sync>)
            .collect(),
    )
}

fn run_backtest(config_path: &Path, dry_run: bool, json: bool) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let definitions = match load_definitions(&config) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    if definitions.is_empty() {
        eprintln!("error: no valid strategy definitions found");
        return ExitCode::from(4);
    }
    eprintln!("Loaded {} strategies", definitions.len());

    if let Some(portfolio) = &config.portfolio {
        for entry in &portfolio.entries {
            if !definitions.iter().any(|d| d.id == entry.strategy_id) {
                eprintln!(
                    "warning: portfolio weight for unknown strategy '{}'",
                    entry.strategy_id
                );
            }
        }
    }

    if dry_run {
        for def in &definitions {
            eprintln!("  {}: {}", def.id, def.name);
        }
        eprintln!("\nDry run complete: configuration is valid");
        return ExitCode::SUCCESS;
    }

    let bars = match bar_source(&config).fetch_bars(&config.symbol, config.start_date, config.end_date) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    let engine = match config.workers {
        Some(n) => match Engine::new().with_workers(n) {
            Ok(engine) => engine,
            Err(e) => return fail(&e),
        },
        None => Engine::new(),
    };

    eprintln!(
        "Running backtest: {} strategies on {}, {} to {}",
        definitions.len(),
        config.symbol,
        config.start_date,
        config.end_date,
    );
    let report = match engine.backtest(
        &bars,
        &definitions,
        config.portfolio.as_ref(),
        config.start_date,
        config.end_date,
    ) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    if json {
        match serde_json::to_string_pretty(&Summary::from_report(&report)) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("error: failed to serialize summary: {e}");
                return ExitCode::from(1);
            }
        }
    } else {
        print_report(&report);
    }

    match report.failures.values().next() {
        Some(err) if report.strategies.is_empty() => err.into(),
        _ => ExitCode::SUCCESS,
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioSummary {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// Machine-readable backtest outcome. Non-finite metrics serialize as `null`.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub strategies: BTreeMap<String, Metrics>,
    pub failures: BTreeMap<String, String>,
    pub portfolio: Option<PortfolioSummary>,
}

impl Summary {
    pub fn from_report(report: &BacktestReport) -> Self {
        Summary {
            strategies: report
                .strategies
                .iter()
                .map(|(id, r)| (id.clone(), Metrics::compute(r)))
                .collect(),
            failures: report
                .failures
                .iter()
                .map(|(id, e)| (id.clone(), e.to_string()))
                .collect(),
            portfolio: report.portfolio.as_ref().map(|p| {
                let curve = metrics::cumulative(p.values());
                PortfolioSummary {
                    total_return: curve.last().map(|c| c - 1.0).unwrap_or(0.0),
                    sharpe_ratio: metrics::sharpe_ratio(p.values()),
                    max_drawdown: metrics::max_drawdown(&curve),
                }
            }),
        }
    }
}

fn print_report(report: &BacktestReport) {
    eprintln!("\n=== Strategy Results ===");
    for (id, result) in &report.strategies {
        let m = Metrics::compute(result);
        eprintln!(
            "  {}:  return {:.2}%, annualized {:.2}%, sharpe {:.2}, max drawdown {:.1}%, {} trades",
            id,
            m.total_return * 100.0,
            m.annualized_return * 100.0,
            m.sharpe_ratio,
            m.max_drawdown * 100.0,
            m.trade_frequency,
        );
    }

    if !report.failures.is_empty() {
        eprintln!("\n=== Failed Strategies ===");
        for (id, err) in &report.failures {
            eprintln!("  {}: {}", id, err);
        }
    }

    if let Some(p) = Summary::from_report(report).portfolio {
        eprintln!("\n=== Portfolio ===");
        eprintln!("Total Return:     {:.2}%", p.total_return * 100.0);
        eprintln!("Sharpe Ratio:     {:.2}", p.sharpe_ratio);
        eprintln!("Max Drawdown:     {:.1}%", p.max_drawdown * 100.0);
    }
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let records = match read_definitions(strategy_path) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    let bars = match validator::canonical_bars() {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    let library = IndicatorLibrary::default();
    let mut all_ok = true;
    for (id, record) in &records {
        let report = validator::validate_record(&library, id, record, &bars);
        if !report.ok {
            all_ok = false;
            eprintln!("\n{}: invalid", id);
            eprintln!("  error: {}", report.message);
            continue;
        }
        eprintln!("\n{}: {}", id, report.message);
        if let Some(m) = report.metrics {
            eprintln!("  Total Return:     {:.2}%", m.total_return * 100.0);
            eprintln!("  Annualized:       {:.2}%", m.annualized_return * 100.0);
            eprintln!("  Sharpe Ratio:     {:.2}", m.sharpe_ratio);
            eprintln!("  Max Drawdown:     {:.1}%", m.max_drawdown * 100.0);
            eprintln!(
                "  Signals:          {} buy, {} sell",
                m.buy_count, m.sell_count
            );
            eprintln!(
                "  Position:         max {:.2}, min {:.2}, mean {:.3}",
                m.position_stats.max, m.position_stats.min, m.position_stats.mean
            );
        }
    }

    if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let mut symbols = Vec::new();
    for dir in &config.data_dirs {
        match CsvBarAdapter::new(dir.clone()).list_symbols() {
            Ok(found) => symbols.extend(found),
            Err(e) => eprintln!("warning: {e}"),
        }
    }
    symbols.sort();
    symbols.dedup();

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
