#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use stratforge::adapters::csv_adapter::CsvBarAdapter;
pub use stratforge::domain::bar::{Bar, BarSeries};
use stratforge::domain::schema;
use stratforge::domain::strategy::StrategyDefinition;
use stratforge::ports::data_port::BarStore;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_bar(date: NaiveDate, close: f64) -> Bar {
    Bar {
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1000,
    }
}

/// Consecutive calendar days of bars with the given closes.
pub fn bars_from_closes(start: &str, closes: &[f64]) -> BarSeries {
    let start = date(start);
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(start + Duration::days(i as i64), close))
        .collect();
    BarSeries::new(bars).unwrap()
}

/// Deterministic oscillating series, long enough for MACD and RSI warmup.
pub fn wave_bars(start: &str, n: usize) -> BarSeries {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 + 8.0 * (x / 9.0).sin() + 2.0 * (x / 2.5).cos() + 0.05 * x
        })
        .collect();
    bars_from_closes(start, &closes)
}

pub fn strategy_record(name: &str, buy: &str, sell: &str, value: f64) -> Value {
    json!({
        "name": name,
        "description": "",
        "parameters": {},
        "indicators": [],
        "signals": { "buy": buy, "sell": sell },
        "position_sizing": { "type": "fixed", "value": value },
    })
}

pub fn ma_crossover_record() -> Value {
    json!({
        "name": "MA crossover",
        "description": "fast over slow",
        "parameters": { "fast": 5, "slow": 20 },
        "indicators": [
            { "name": "fast_ma", "formula": "rolling_mean(close, params.fast)", "params": {} },
            { "name": "slow_ma", "builtin": "moving_average", "params": { "window": 20, "type": "EMA" } },
        ],
        "signals": { "buy": "fast_ma > slow_ma", "sell": "fast_ma < slow_ma" },
        "position_sizing": { "type": "fixed", "value": 0.5 },
    })
}

pub fn rsi_reversion_record() -> Value {
    json!({
        "name": "RSI reversion",
        "parameters": { "low": 30, "high": 70 },
        "indicators": [
            { "name": "rsi", "formula": "rsi(close, params.period)", "params": { "period": 14 } },
            { "name": "macd", "builtin": "macd", "params": { "fast": 12, "slow": 26, "signal": 9 } },
        ],
        "signals": {
            "buy": "rsi < params.low and macd_histogram > 0",
            "sell": "rsi > params.high or macd_line < macd_signal",
        },
        "position_sizing": { "type": "Fixed", "value": 0.25 },
    })
}

pub fn definition(id: &str, record: &Value) -> StrategyDefinition {
    schema::parse_definition(id, record).unwrap()
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

pub fn write_bars_csv(dir: &Path, symbol: &str, bars: &BarSeries) {
    CsvBarAdapter::new(dir.to_path_buf())
        .save_bars(symbol, bars)
        .unwrap();
}

/// `ExitCode` has no `PartialEq`; compare through its debug form.
pub fn same_exit(a: ExitCode, b: ExitCode) -> bool {
    format!("{a:?}") == format!("{b:?}")
}
