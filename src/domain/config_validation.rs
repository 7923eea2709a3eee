//! Engine configuration validation.
//!
//! Validates every config field and produces a typed [`EngineConfig`] before
//! any data is read or strategy run.

use crate::domain::error::EngineError;
use crate::domain::strategy::PortfolioDefinition;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Bar directories, tried in order until one yields data.
    pub data_dirs: Vec<PathBuf>,
    pub symbol: String,
    /// Dedicated worker count; `None` uses rayon's global pool.
    pub workers: Option<usize>,
    /// Strategy directories, merged in order (later overrides earlier).
    pub strategy_dirs: Vec<PathBuf>,
    pub portfolio: Option<PortfolioDefinition>,
    /// Reject portfolios whose weights do not sum to 1.
    pub strict_weights: bool,
}

pub fn load_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, EngineError> {
    let (start_date, end_date) = validate_dates(config)?;
    let data_dirs = path_list(config, "backtest", "data_dir")?;
    let symbol = required(config, "backtest", "symbol")?;
    let workers = validate_workers(config)?;
    let strategy_dirs = path_list(config, "strategies", "dirs")?;
    let portfolio = validate_portfolio(config)?;
    let strict_weights = config.get_bool("portfolio", "strict_weights", false);

    if strict_weights {
        if let Some(p) = &portfolio {
            p.check_weights().map_err(|e| EngineError::ConfigInvalid {
                section: "portfolio".to_string(),
                key: "weights".to_string(),
                reason: e.reason,
            })?;
        }
    }

    Ok(EngineConfig {
        start_date,
        end_date,
        data_dirs,
        symbol,
        workers,
        strategy_dirs,
        portfolio,
        strict_weights,
    })
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, EngineError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), EngineError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if end_date < start_date {
        return Err(EngineError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "end_date".to_string(),
            reason: "end_date must not precede start_date".to_string(),
        });
    }
    Ok((start_date, end_date))
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, EngineError> {
    match value {
        None => Err(EngineError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            EngineError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }
        }),
    }
}

fn validate_workers(config: &dyn ConfigPort) -> Result<Option<usize>, EngineError> {
    let Some(raw) = config.get_string("backtest", "workers") else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(EngineError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "workers".to_string(),
            reason: "workers must be a positive integer".to_string(),
        }),
    }
}

/// Comma-separated, order-preserving path list; at least one entry.
fn path_list(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Vec<PathBuf>, EngineError> {
    let raw = required(config, section, key)?;
    let paths: Vec<PathBuf> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        return Err(EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        });
    }
    Ok(paths)
}

/// Parse `weights = id:w, id:w`.
fn validate_portfolio(config: &dyn ConfigPort) -> Result<Option<PortfolioDefinition>, EngineError> {
    let raw = match config.get_string("portfolio", "weights") {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(None),
    };

    let invalid = |reason: String| EngineError::ConfigInvalid {
        section: "portfolio".to_string(),
        key: "weights".to_string(),
        reason,
    };

    let mut portfolio = PortfolioDefinition::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, weight) = entry
            .split_once(':')
            .ok_or_else(|| invalid(format!("expected 'id:weight', got '{}'", entry)))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(invalid(format!("missing strategy id in '{}'", entry)));
        }
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid weight in '{}'", entry)))?;
        if !weight.is_finite() {
            return Err(invalid(format!("invalid weight in '{}'", entry)));
        }
        if portfolio.entries.iter().any(|e| e.strategy_id == id) {
            return Err(invalid(format!("strategy '{}' listed twice", id)));
        }
        portfolio = portfolio.with(id, weight);
    }
    Ok(Some(portfolio))
}
