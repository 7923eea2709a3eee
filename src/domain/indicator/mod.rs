//! Technical indicator library.
//!
//! This module provides:
//! - `Indicator`: the closed set of built-in indicators, built from a `ParameterSet`
//! - `IndicatorOutput`: one named output column of an indicator
//! - `IndicatorLibrary`: a registration table mapping indicator ids to compute functions
//!
//! The numeric kernels in the submodules are shared with the expression
//! evaluator's built-in functions, so `sma(close, 5)` in a formula and the
//! `sma` library entry with `window = 5` produce identical values.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;

use crate::domain::bar::Bar;
use crate::domain::error::ExpressionError;
use crate::domain::params::{ParamValue, ParameterSet};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_MA_WINDOW: usize = 20;
pub const DEFAULT_RSI_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovingAverageKind {
    Sma,
    Ema,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Indicator {
    MovingAverage {
        window: usize,
        kind: MovingAverageKind,
    },
    Rsi {
        period: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub name: String,
    pub values: Vec<f64>,
}

impl Indicator {
    pub fn output_names(&self) -> &'static [&'static str] {
        match self {
            Indicator::MovingAverage { .. } | Indicator::Rsi { .. } => &["value"],
            Indicator::Macd { .. } => &["line", "signal", "histogram"],
        }
    }

    /// Compute every output over `input`, in [`Indicator::output_names`] order.
    pub fn compute(&self, input: &[f64]) -> Vec<IndicatorOutput> {
        let columns = match self {
            Indicator::MovingAverage {
                window,
                kind: MovingAverageKind::Sma,
            } => vec![sma::rolling_mean(input, *window)],
            Indicator::MovingAverage {
                window,
                kind: MovingAverageKind::Ema,
            } => vec![ema::ewm_mean(input, *window)],
            Indicator::Rsi { period } => vec![rsi::rsi(input, *period)],
            Indicator::Macd { fast, slow, signal } => {
                let out = macd::macd(input, *fast, *slow, *signal);
                vec![out.line, out.signal, out.histogram]
            }
        };

        self.output_names()
            .iter()
            .zip(columns)
            .map(|(name, values)| IndicatorOutput {
                name: name.to_string(),
                values,
            })
            .collect()
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::MovingAverage {
                window,
                kind: MovingAverageKind::Sma,
            } => write!(f, "SMA({})", window),
            Indicator::MovingAverage {
                window,
                kind: MovingAverageKind::Ema,
            } => write!(f, "EMA({})", window),
            Indicator::Rsi { period } => write!(f, "RSI({})", period),
            Indicator::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
        }
    }
}

/// Read a positive integer window parameter, falling back to `default`.
pub fn window_param(
    params: &ParameterSet,
    name: &str,
    default: Option<usize>,
    function: &str,
) -> Result<usize, ExpressionError> {
    match params.get(name) {
        None => default.ok_or_else(|| ExpressionError::Unbound {
            name: format!("params.{}", name),
        }),
        Some(ParamValue::Str(_)) => Err(ExpressionError::TypeMismatch {
            context: format!("{} parameter '{}'", function, name),
            expected: "number",
            found: "string",
        }),
        Some(value) => {
            let v = value.as_f64().unwrap_or(f64::NAN);
            window_from_f64(v, function)
        }
    }
}

/// Validate a window size given as a float: it must be a positive integer.
pub fn window_from_f64(value: f64, function: &str) -> Result<usize, ExpressionError> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(ExpressionError::InvalidWindow {
            function: function.to_string(),
            value,
        })
    }
}

fn moving_average_kind(params: &ParameterSet) -> Result<MovingAverageKind, ExpressionError> {
    match params.get("type") {
        None => Ok(MovingAverageKind::Sma),
        Some(ParamValue::Str(s)) => match s.to_ascii_uppercase().as_str() {
            "SMA" => Ok(MovingAverageKind::Sma),
            "EMA" => Ok(MovingAverageKind::Ema),
            _ => Err(ExpressionError::Disallowed {
                name: format!("moving average type '{}'", s),
            }),
        },
        Some(_) => Err(ExpressionError::TypeMismatch {
            context: "moving_average parameter 'type'".to_string(),
            expected: "string",
            found: "number",
        }),
    }
}

impl Indicator {
    /// Build a built-in indicator from its library id and parameters.
    pub fn from_params(id: &str, params: &ParameterSet) -> Result<Indicator, ExpressionError> {
        match id {
            "moving_average" => Ok(Indicator::MovingAverage {
                window: window_param(params, "window", Some(DEFAULT_MA_WINDOW), id)?,
                kind: moving_average_kind(params)?,
            }),
            "sma" => Ok(Indicator::MovingAverage {
                window: window_param(params, "window", Some(DEFAULT_MA_WINDOW), id)?,
                kind: MovingAverageKind::Sma,
            }),
            "ema" => Ok(Indicator::MovingAverage {
                window: window_param(params, "window", Some(DEFAULT_MA_WINDOW), id)?,
                kind: MovingAverageKind::Ema,
            }),
            "rsi" => Ok(Indicator::Rsi {
                period: window_param(params, "period", Some(DEFAULT_RSI_PERIOD), id)?,
            }),
            "macd" => Ok(Indicator::Macd {
                fast: window_param(params, "fast", Some(macd::DEFAULT_FAST), id)?,
                slow: window_param(params, "slow", Some(macd::DEFAULT_SLOW), id)?,
                signal: window_param(params, "signal", Some(macd::DEFAULT_SIGNAL), id)?,
            }),
            _ => Err(ExpressionError::Disallowed {
                name: format!("indicator '{}'", id),
            }),
        }
    }
}

/// Compute function stored in the library table.
pub type ComputeFn = fn(&[f64], &ParameterSet) -> Result<Vec<IndicatorOutput>, ExpressionError>;

fn compute_moving_average(
    input: &[f64],
    params: &ParameterSet,
) -> Result<Vec<IndicatorOutput>, ExpressionError> {
    Ok(Indicator::from_params("moving_average", params)?.compute(input))
}

fn compute_sma(input: &[f64], params: &ParameterSet) -> Result<Vec<IndicatorOutput>, ExpressionError> {
    Ok(Indicator::from_params("sma", params)?.compute(input))
}

fn compute_ema(input: &[f64], params: &ParameterSet) -> Result<Vec<IndicatorOutput>, ExpressionError> {
    Ok(Indicator::from_params("ema", params)?.compute(input))
}

fn compute_rsi(input: &[f64], params: &ParameterSet) -> Result<Vec<IndicatorOutput>, ExpressionError> {
    Ok(Indicator::from_params("rsi", params)?.compute(input))
}

fn compute_macd(input: &[f64], params: &ParameterSet) -> Result<Vec<IndicatorOutput>, ExpressionError> {
    Ok(Indicator::from_params("macd", params)?.compute(input))
}

/// Registration table of indicators callable by id.
#[derive(Debug, Clone)]
pub struct IndicatorLibrary {
    table: HashMap<String, ComputeFn>,
}

impl Default for IndicatorLibrary {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Name of the input column for indicator `id`: the `column` parameter,
/// `close` when absent.
pub fn input_column<'p>(id: &str, params: &'p ParameterSet) -> Result<&'p str, ExpressionError> {
    match params.get("column") {
        None => Ok("close"),
        Some(value) => value.as_str().ok_or_else(|| ExpressionError::TypeMismatch {
            context: format!("{} parameter 'column'", id),
            expected: "string",
            found: "number",
        }),
    }
}

impl IndicatorLibrary {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut library = Self::empty();
        library.register("moving_average", compute_moving_average);
        library.register("sma", compute_sma);
        library.register("ema", compute_ema);
        library.register("rsi", compute_rsi);
        library.register("macd", compute_macd);
        library
    }

    /// Add or replace an indicator id.
    pub fn register(&mut self, id: &str, compute: ComputeFn) {
        self.table.insert(id.to_string(), compute);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.table.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.table.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Compute indicator `id` over an arbitrary input column.
    pub fn compute_series(
        &self,
        id: &str,
        input: &[f64],
        params: &ParameterSet,
    ) -> Result<Vec<IndicatorOutput>, ExpressionError> {
        let compute = self
            .table
            .get(id)
            .ok_or_else(|| ExpressionError::Disallowed {
                name: format!("indicator '{}'", id),
            })?;
        let outputs = compute(input, params)?;
        if let Some(bad) = outputs.iter().find(|o| o.values.len() != input.len()) {
            return Err(ExpressionError::Misaligned {
                function: format!("{}.{}", id, bad.name),
                expected: input.len(),
                found: bad.values.len(),
            });
        }
        Ok(outputs)
    }

    /// Compute indicator `id` directly over bars. The input column is the
    /// `column` parameter (default `close`).
    pub fn compute(
        &self,
        id: &str,
        bars: &[Bar],
        params: &ParameterSet,
    ) -> Result<Vec<IndicatorOutput>, ExpressionError> {
        let column = input_column(id, params)?;
        let input: Vec<f64> = bars
            .iter()
            .map(|b| b.field(column))
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| ExpressionError::Unbound {
                name: column.to_string(),
            })?;
        self.compute_series(id, &input, params)
    }
}
