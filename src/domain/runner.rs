//! Strategy runner.
//!
//! Executes one definition against a bar slice:
//! 1. slice bars to `[start, end]` (empty slice is a range error)
//! 2. compute indicators in declared order into the run's own frame
//! 3. evaluate buy/sell conditions into signals (sell wins ties)
//! 4. size positions from signals
//! 5. realize returns using the previous bar's position

use crate::domain::bar::{Bar, BarSeries};
use crate::domain::error::{EngineError, ExpressionError};
use crate::domain::expr_eval::{self, Frame};
use crate::domain::expr_parser::parse_expression;
use crate::domain::indicator::{self, IndicatorLibrary, IndicatorOutput};
use crate::domain::params::ParameterSet;
use crate::domain::series::{Column, PositionSeries, ReturnSeries, SignalSeries};
use crate::domain::strategy::{IndicatorSource, IndicatorSpec, PositionSizing, StrategyDefinition};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

pub const BUY: i8 = 1;
pub const HOLD: i8 = 0;
pub const SELL: i8 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub signals: SignalSeries,
    pub positions: PositionSeries,
    pub returns: ReturnSeries,
    /// Indicator columns computed during the run, keyed by column name.
    pub columns: BTreeMap<String, Column>,
}

pub fn run(
    definition: &StrategyDefinition,
    bars: &BarSeries,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<RunResult, EngineError> {
    run_with(&IndicatorLibrary::default(), definition, bars, start_date, end_date)
}

pub fn run_with(
    library: &IndicatorLibrary,
    definition: &StrategyDefinition,
    bars: &BarSeries,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<RunResult, EngineError> {
    let slice = bars.slice(start_date, end_date)?;
    run_slice(library, definition, slice)
}

/// Run over an already sliced, non-empty bar window.
pub fn run_slice(
    library: &IndicatorLibrary,
    definition: &StrategyDefinition,
    bars: &[Bar],
) -> Result<RunResult, EngineError> {
    debug!(strategy = %definition.id, bars = bars.len(), "Running strategy");

    let fail = |target: String| {
        let strategy = definition.id.clone();
        move |source: ExpressionError| EngineError::Evaluation {
            strategy,
            target,
            source,
        }
    };

    let mut frame = Frame::new(bars);
    for spec in &definition.indicators {
        let columns = compute_indicator(library, definition, spec, &frame)
            .map_err(fail(format!("indicator '{}'", spec.name)))?;
        for (name, column) in columns {
            frame.attach(name, column);
        }
    }

    let buy = evaluate_side(&definition.signals.buy, &frame, &definition.parameters)
        .map_err(fail("signals.buy".to_string()))?;
    let sell = evaluate_side(&definition.signals.sell, &frame, &definition.parameters)
        .map_err(fail("signals.sell".to_string()))?;

    let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let signals = combine_signals(&buy, &sell);
    let positions = size_positions(&signals, &definition.position_sizing);
    let returns = lagged_returns(&closes, &positions);

    Ok(RunResult {
        signals: SignalSeries::new(dates.clone(), signals),
        positions: PositionSeries::new(dates.clone(), positions),
        returns: ReturnSeries::new(dates, returns),
        columns: frame.into_derived(),
    })
}

fn evaluate_side(
    source: &str,
    frame: &Frame<'_>,
    params: &ParameterSet,
) -> Result<Vec<bool>, ExpressionError> {
    let expr = parse_expression(source)?;
    expr_eval::evaluate_condition(&expr, frame, params)
}

fn compute_indicator(
    library: &IndicatorLibrary,
    definition: &StrategyDefinition,
    spec: &IndicatorSpec,
    frame: &Frame<'_>,
) -> Result<Vec<(String, Column)>, ExpressionError> {
    let columns = match &spec.source {
        IndicatorSource::Formula(formula) => {
            let params = definition.parameters.overlaid_with(&spec.params);
            let expr = parse_expression(formula)?;
            let column = expr_eval::evaluate(&expr, frame, &params)?;
            let name = spec
                .outputs
                .as_ref()
                .and_then(|o| o.first().cloned())
                .unwrap_or_else(|| spec.name.clone());
            vec![(name, column)]
        }
        IndicatorSource::Builtin(id) => {
            let input_name = indicator::input_column(id, &spec.params)?;
            let input = match frame.column(input_name) {
                Some(Column::Numeric(values)) => values,
                Some(other) => {
                    return Err(ExpressionError::TypeMismatch {
                        context: format!("input column '{}'", input_name),
                        expected: "numeric series",
                        found: other.type_name(),
                    });
                }
                None => {
                    return Err(ExpressionError::Unbound {
                        name: input_name.to_string(),
                    });
                }
            };
            let produced = library.compute_series(id, &input, &spec.params)?;
            name_outputs(spec, id, produced)?
        }
    };

    for (name, _) in &columns {
        if frame.has_column(name) {
            return Err(ExpressionError::Disallowed {
                name: format!("redefinition of column '{}'", name),
            });
        }
    }
    Ok(columns)
}

fn name_outputs(
    spec: &IndicatorSpec,
    id: &str,
    produced: Vec<IndicatorOutput>,
) -> Result<Vec<(String, Column)>, ExpressionError> {
    let names: Vec<String> = match &spec.outputs {
        Some(outputs) => outputs.clone(),
        None if produced.len() == 1 => vec![spec.name.clone()],
        None => produced
            .iter()
            .map(|o| format!("{}_{}", spec.name, o.name))
            .collect(),
    };
    if names.len() != produced.len() {
        return Err(ExpressionError::Arity {
            function: id.to_string(),
            expected: produced.len(),
            found: names.len(),
        });
    }
    Ok(names
        .into_iter()
        .zip(produced)
        .map(|(name, output)| (name, Column::Numeric(output.values)))
        .collect())
}

/// +1 where buy holds, -1 where sell holds, 0 otherwise; sell wins ties.
pub fn combine_signals(buy: &[bool], sell: &[bool]) -> Vec<i8> {
    buy.iter()
        .zip(sell)
        .map(|(&b, &s)| {
            if s {
                SELL
            } else if b {
                BUY
            } else {
                HOLD
            }
        })
        .collect()
}

pub fn size_positions(signals: &[i8], sizing: &PositionSizing) -> Vec<f64> {
    signals.iter().map(|&s| sizing.position(s)).collect()
}

/// `r[0] = 0`, `r[t] = (close[t] / close[t-1] - 1) * position[t-1]`.
pub fn lagged_returns(closes: &[f64], positions: &[f64]) -> Vec<f64> {
    let mut returns = vec![0.0; closes.len()];
    for t in 1..closes.len() {
        returns[t] = (closes[t] / closes[t - 1] - 1.0) * positions[t - 1];
    }
    returns
}
