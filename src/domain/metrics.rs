//! Performance metrics for a strategy run.

use crate::domain::runner::{BUY, RunResult, SELL};
use serde::Serialize;
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    /// NaN when returns have zero (or undefined) standard deviation.
    pub sharpe_ratio: f64,
    /// Non-positive; 0 means no drawdown.
    pub max_drawdown: f64,
    pub buy_count: usize,
    pub sell_count: usize,
    pub trade_frequency: usize,
    pub position_stats: PositionStats,
}

impl Metrics {
    pub fn compute(result: &RunResult) -> Self {
        Self::from_parts(
            result.returns.values(),
            result.positions.values(),
            result.signals.values(),
        )
    }

    pub fn from_parts(returns: &[f64], positions: &[f64], signals: &[i8]) -> Self {
        let curve = cumulative(returns);
        let total_return = curve.last().map(|c| c - 1.0).unwrap_or(0.0);

        let n = returns.len() as f64;
        let annualized_return = if n > 0.0 {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n) - 1.0
        } else {
            0.0
        };

        let buy_count = signals.iter().filter(|&&s| s == BUY).count();
        let sell_count = signals.iter().filter(|&&s| s == SELL).count();

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio: sharpe_ratio(returns),
            max_drawdown: max_drawdown(&curve),
            buy_count,
            sell_count,
            trade_frequency: buy_count + sell_count,
            position_stats: PositionStats {
                max: Statistics::max(positions.iter().copied()),
                min: Statistics::min(positions.iter().copied()),
                mean: positions.iter().copied().mean(),
            },
        }
    }
}

/// Running product of `1 + r`.
pub fn cumulative(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

/// Annualized mean over sample standard deviation; NaN if the deviation is
/// zero or undefined.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let mean = returns.iter().copied().mean();
    let std_dev = returns.iter().copied().std_dev();
    if std_dev == 0.0 || !std_dev.is_finite() {
        return f64::NAN;
    }
    mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Most negative `cumulative / running_peak - 1`.
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in curve {
        peak = peak.max(value);
        worst = worst.min(value / peak - 1.0);
    }
    worst
}
