//! Strategy validator.
//!
//! Smoke-tests a definition: schema check, a full run over a canonical bar
//! series, then the metrics bundle.

use crate::domain::bar::{Bar, BarSeries};
use crate::domain::error::EngineError;
use crate::domain::indicator::IndicatorLibrary;
use crate::domain::metrics::Metrics;
use crate::domain::runner;
use crate::domain::schema;
use crate::domain::strategy::StrategyDefinition;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub ok: bool,
    pub message: String,
    /// Present only when `ok`.
    pub metrics: Option<Metrics>,
}

impl ValidationReport {
    fn failed(message: String) -> Self {
        Self {
            ok: false,
            message,
            metrics: None,
        }
    }
}

/// Deterministic weekday bars for calendar year 2023.
///
/// A slow sine trend with a faster ripple, so moving-average crossovers,
/// RSI swings and MACD sign changes all occur.
pub fn canonical_bars() -> Result<BarSeries, EngineError> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).ok_or_else(|| EngineError::Data {
        reason: "invalid canonical start date".into(),
    })?;

    let mut bars = Vec::new();
    let mut date = start;
    let mut prev_close = 100.0;
    while date.year() == 2023 {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let i = bars.len() as f64;
            let close = 100.0 + 12.0 * (i / 25.0).sin() + 3.0 * (i / 3.0).sin() + 0.02 * i;
            let open = prev_close;
            bars.push(Bar {
                date,
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 1_000_000 + ((i * 7.0) as i64 % 13) * 10_000,
            });
            prev_close = close;
        }
        date += Duration::days(1);
    }

    BarSeries::new(bars)
}

/// Run an already-parsed definition over `bars` and report metrics.
pub fn validate_definition(
    library: &IndicatorLibrary,
    definition: &StrategyDefinition,
    bars: &BarSeries,
) -> ValidationReport {
    match runner::run_with(
        library,
        definition,
        bars,
        bars.first_date(),
        bars.last_date(),
    ) {
        Ok(result) => {
            let metrics = Metrics::compute(&result);
            debug!(strategy = %definition.id, total_return = metrics.total_return, "Validation run complete");
            ValidationReport {
                ok: true,
                message: format!("strategy '{}' is valid", definition.name),
                metrics: Some(metrics),
            }
        }
        Err(e) => ValidationReport::failed(e.to_string()),
    }
}

/// Validate a raw record: schema first, then a run over `bars`.
pub fn validate_record(
    library: &IndicatorLibrary,
    id: &str,
    record: &Value,
    bars: &BarSeries,
) -> ValidationReport {
    match schema::parse_definition(id, record) {
        Ok(definition) => validate_definition(library, &definition, bars),
        Err(e) => ValidationReport::failed(e.to_string()),
    }
}
