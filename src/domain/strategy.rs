//! Validated strategy definitions and portfolio weights.

use crate::domain::error::SchemaError;
use crate::domain::indicator::Indicator;
use crate::domain::params::{ParamValue, ParameterSet};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Weights must sum to 1 within this tolerance.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorSource {
    /// An expression evaluated over the frame.
    Formula(String),
    /// An indicator library id.
    Builtin(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub name: String,
    pub source: IndicatorSource,
    pub params: ParameterSet,
    /// Explicit output column names; `None` uses the default naming.
    pub outputs: Option<Vec<String>>,
}

impl IndicatorSpec {
    /// Output column names this indicator attaches to the frame.
    ///
    /// Formulas and single-output builtins attach one column named after the
    /// indicator; multi-output builtins attach `<name>_<output>` columns.
    pub fn output_columns(&self) -> Vec<String> {
        if let Some(outputs) = &self.outputs {
            return outputs.clone();
        }
        match &self.source {
            IndicatorSource::Formula(_) => vec![self.name.clone()],
            IndicatorSource::Builtin(id) => match Indicator::from_params(id, &self.params) {
                Ok(indicator) if indicator.output_names().len() > 1 => indicator
                    .output_names()
                    .iter()
                    .map(|output| format!("{}_{}", self.name, output))
                    .collect(),
                _ => vec![self.name.clone()],
            },
        }
    }
}

/// One boolean expression per side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub buy: String,
    pub sell: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSizing {
    /// Constant fraction of capital in (0, 1].
    Fixed { value: f64 },
}

impl PositionSizing {
    /// Signed exposure for a signal in {-1, 0, +1}.
    pub fn position(&self, signal: i8) -> f64 {
        match self {
            PositionSizing::Fixed { value } => f64::from(signal) * value,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PositionSizing::Fixed { .. } => "fixed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: ParameterSet,
    pub indicators: Vec<IndicatorSpec>,
    pub signals: SignalSpec,
    pub position_sizing: PositionSizing,
}

fn params_to_json(params: &ParameterSet) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| {
            let value = match v {
                ParamValue::Int(i) => json!(i),
                ParamValue::Float(f) => json!(f),
                ParamValue::Str(s) => json!(s),
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(map)
}

impl StrategyDefinition {
    /// The language-neutral record this definition was parsed from.
    pub fn to_record(&self) -> Value {
        let indicators: Vec<Value> = self
            .indicators
            .iter()
            .map(|ind| {
                let mut record = Map::new();
                record.insert("name".into(), json!(ind.name));
                match &ind.source {
                    IndicatorSource::Formula(f) => record.insert("formula".into(), json!(f)),
                    IndicatorSource::Builtin(b) => record.insert("builtin".into(), json!(b)),
                };
                record.insert("params".into(), params_to_json(&ind.params));
                if let Some(outputs) = &ind.outputs {
                    record.insert("outputs".into(), json!(outputs));
                }
                Value::Object(record)
            })
            .collect();

        let PositionSizing::Fixed { value } = self.position_sizing;
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": params_to_json(&self.parameters),
            "indicators": indicators,
            "signals": { "buy": self.signals.buy, "sell": self.signals.sell },
            "position_sizing": { "type": self.position_sizing.type_name(), "value": value },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioEntry {
    pub strategy_id: String,
    pub weight: f64,
}

/// Ordered strategy weights for aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioDefinition {
    pub entries: Vec<PortfolioEntry>,
}

impl PortfolioDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy_id: &str, weight: f64) -> Self {
        self.entries.push(PortfolioEntry {
            strategy_id: strategy_id.to_string(),
            weight,
        });
        self
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|e| (e.strategy_id.clone(), e.weight))
            .collect()
    }

    /// Opt-in check that the weights sum to 1.
    pub fn check_weights(&self) -> Result<(), SchemaError> {
        let total = self.total_weight();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(SchemaError::invalid(
                "portfolio.weights",
                format!("weights sum to {}, expected 1", total),
            ));
        }
        Ok(())
    }
}
