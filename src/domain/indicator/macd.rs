//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9

use crate::domain::indicator::ema::ewm_mean;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd_line(values: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let ema_fast = ewm_mean(values, fast);
    let ema_slow = ewm_mean(values, slow);
    ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect()
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdOutput {
    let line = macd_line(values, fast, slow);
    let signal = ewm_mean(&line, signal_period);
    let histogram = line
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| l - s)
        .collect();

    MacdOutput {
        line,
        signal,
        histogram,
    }
}
