//! Strategy definition schema validation.
//!
//! Turns a language-neutral record (JSON or TOML, both read into a
//! `serde_json::Value`) into a [`StrategyDefinition`], failing with a
//! field-level [`SchemaError`] on the first violation found.

use crate::domain::bar::BAR_COLUMNS;
use crate::domain::error::SchemaError;
use crate::domain::indicator::Indicator;
use crate::domain::params::{ParamValue, ParameterSet};
use crate::domain::strategy::{
    IndicatorSource, IndicatorSpec, PositionSizing, SignalSpec, StrategyDefinition,
};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const REQUIRED_FIELDS: [&str; 5] = [
    "name",
    "parameters",
    "indicators",
    "signals",
    "position_sizing",
];

const RESERVED_NAMES: [&str; 6] = ["and", "or", "not", "true", "false", "params"];

/// Validate a record, reporting `(ok, message)`.
pub fn validate_record(record: &Value) -> (bool, String) {
    match validate(record) {
        Ok(()) => (true, "strategy definition is valid".to_string()),
        Err(e) => (false, e.to_string()),
    }
}

pub fn validate(record: &Value) -> Result<(), SchemaError> {
    parse_definition("", record).map(|_| ())
}

/// Split a document into `(id, record)` pairs.
///
/// A document with a top-level `strategies` table holds one record per key;
/// any other document is a single record identified by `default_id`.
pub fn split_document(default_id: &str, document: Value) -> Vec<(String, Value)> {
    match document {
        Value::Object(mut map) if matches!(map.get("strategies"), Some(Value::Object(_))) => {
            match map.remove("strategies") {
                Some(Value::Object(strategies)) => strategies.into_iter().collect(),
                _ => Vec::new(),
            }
        }
        other => vec![(default_id.to_string(), other)],
    }
}

pub fn parse_definition(id: &str, record: &Value) -> Result<StrategyDefinition, SchemaError> {
    let root = record
        .as_object()
        .ok_or_else(|| SchemaError::invalid("definition", "must be a table"))?;

    for field in REQUIRED_FIELDS {
        if !root.contains_key(field) {
            return Err(SchemaError::missing(field));
        }
    }

    let name = required_string(root, "name", "name")?;
    let description = match root.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(SchemaError::invalid("description", "must be a string")),
    };

    let parameters = parse_params(&root["parameters"], "parameters")?;
    let indicators = parse_indicators(&root["indicators"])?;
    let signals = parse_signals(&root["signals"])?;
    let position_sizing = parse_position_sizing(&root["position_sizing"])?;

    Ok(StrategyDefinition {
        id: id.to_string(),
        name,
        description,
        parameters,
        indicators,
        signals,
        position_sizing,
    })
}

fn required_string(map: &Map<String, Value>, key: &str, field: &str) -> Result<String, SchemaError> {
    match map.get(key) {
        None => Err(SchemaError::missing(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(SchemaError::invalid(field, "must not be empty")),
        Some(_) => Err(SchemaError::invalid(field, "must be a string")),
    }
}

fn parse_params(value: &Value, field: &str) -> Result<ParameterSet, SchemaError> {
    let map = value
        .as_object()
        .ok_or_else(|| SchemaError::invalid(field, "must be a table"))?;

    let mut params = ParameterSet::new();
    for (key, v) in map {
        let param = ParamValue::from_json(v).ok_or_else(|| {
            SchemaError::invalid(format!("{}.{}", field, key), "must be a number or string")
        })?;
        params.insert(key.clone(), param);
    }
    Ok(params)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_') && !RESERVED_NAMES.contains(&name)
}

fn parse_indicators(value: &Value) -> Result<Vec<IndicatorSpec>, SchemaError> {
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::invalid("indicators", "must be a list"))?;

    let mut specs = Vec::with_capacity(items.len());
    let mut columns: HashSet<String> = BAR_COLUMNS.iter().map(|c| c.to_string()).collect();

    for (i, item) in items.iter().enumerate() {
        let prefix = format!("indicators[{}]", i);
        let spec = parse_indicator(item, &prefix)?;

        let output_field = if spec.outputs.is_some() {
            format!("{}.outputs", prefix)
        } else {
            format!("{}.name", prefix)
        };
        for column in spec.output_columns() {
            if !columns.insert(column.clone()) {
                return Err(SchemaError::invalid(
                    output_field,
                    format!("column '{}' is already defined", column),
                ));
            }
        }
        specs.push(spec);
    }

    Ok(specs)
}

fn parse_indicator(item: &Value, prefix: &str) -> Result<IndicatorSpec, SchemaError> {
    let map = item
        .as_object()
        .ok_or_else(|| SchemaError::invalid(prefix, "must be a table"))?;

    let name_field = format!("{}.name", prefix);
    let name = required_string(map, "name", &name_field)?;
    if !is_identifier(&name) {
        return Err(SchemaError::invalid(
            name_field,
            format!("'{}' is not a valid column name", name),
        ));
    }

    let params_field = format!("{}.params", prefix);
    let params = match map.get("params") {
        None => return Err(SchemaError::missing(params_field)),
        Some(v) => parse_params(v, &params_field)?,
    };

    let source = match (map.contains_key("formula"), map.contains_key("builtin")) {
        (true, false) => {
            IndicatorSource::Formula(required_string(map, "formula", &format!("{}.formula", prefix))?)
        }
        (false, true) => {
            IndicatorSource::Builtin(required_string(map, "builtin", &format!("{}.builtin", prefix))?)
        }
        (false, false) => return Err(SchemaError::missing(format!("{}.formula", prefix))),
        (true, true) => {
            return Err(SchemaError::invalid(
                prefix,
                "exactly one of 'formula' or 'builtin' may be given",
            ));
        }
    };

    let outputs = match map.get("outputs") {
        None => None,
        Some(v) => Some(parse_outputs(v, &format!("{}.outputs", prefix))?),
    };

    if let (Some(outputs), IndicatorSource::Builtin(id)) = (&outputs, &source) {
        if let Ok(indicator) = Indicator::from_params(id, &params) {
            let expected = indicator.output_names().len();
            if outputs.len() != expected {
                return Err(SchemaError::invalid(
                    format!("{}.outputs", prefix),
                    format!("'{}' produces {} outputs, {} names given", id, expected, outputs.len()),
                ));
            }
        }
    }
    if let (Some(outputs), IndicatorSource::Formula(_)) = (&outputs, &source) {
        if outputs.len() != 1 {
            return Err(SchemaError::invalid(
                format!("{}.outputs", prefix),
                "a formula produces exactly one output",
            ));
        }
    }

    Ok(IndicatorSpec {
        name,
        source,
        params,
        outputs,
    })
}

fn parse_outputs(value: &Value, field: &str) -> Result<Vec<String>, SchemaError> {
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::invalid(field, "must be a list of column names"))?;
    if items.is_empty() {
        return Err(SchemaError::invalid(field, "must not be empty"));
    }

    items
        .iter()
        .map(|v| match v.as_str() {
            Some(s) if is_identifier(s) => Ok(s.to_string()),
            Some(s) => Err(SchemaError::invalid(
                field,
                format!("'{}' is not a valid column name", s),
            )),
            None => Err(SchemaError::invalid(field, "must be a list of column names")),
        })
        .collect()
}

fn parse_signals(value: &Value) -> Result<SignalSpec, SchemaError> {
    let map = value
        .as_object()
        .ok_or_else(|| SchemaError::invalid("signals", "must be a table with buy and sell"))?;

    let side = |key: &str| -> Result<String, SchemaError> {
        let field = format!("signals.{}", key);
        match map.get(key) {
            None => Err(SchemaError::missing(field)),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(Value::String(_)) => Err(SchemaError::invalid(field, "must not be empty")),
            Some(_) => Err(SchemaError::invalid(field, "must be a single expression string")),
        }
    };

    Ok(SignalSpec {
        buy: side("buy")?,
        sell: side("sell")?,
    })
}

fn parse_position_sizing(value: &Value) -> Result<PositionSizing, SchemaError> {
    let map = value
        .as_object()
        .ok_or_else(|| SchemaError::invalid("position_sizing", "must be a table"))?;

    let kind = required_string(map, "type", "position_sizing.type")?;
    if !kind.eq_ignore_ascii_case("fixed") {
        return Err(SchemaError::invalid(
            "position_sizing.type",
            format!("unrecognized sizing type '{}'", kind),
        ));
    }

    let value = match map.get("value") {
        None => return Err(SchemaError::missing("position_sizing.value")),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| SchemaError::invalid("position_sizing.value", "must be a number"))?,
    };
    if !(value > 0.0 && value <= 1.0) {
        return Err(SchemaError::invalid(
            "position_sizing.value",
            format!("must be in (0, 1], got {}", value),
        ));
    }

    Ok(PositionSizing::Fixed { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "MA crossover",
            "description": "fast over slow",
            "parameters": { "fast": 5, "slow": 20 },
            "indicators": [
                { "name": "fast_ma", "formula": "rolling_mean(close, params.fast)", "params": {} },
                { "name": "slow_ma", "builtin": "sma", "params": { "window": 20 } },
            ],
            "signals": { "buy": "fast_ma > slow_ma", "sell": "fast_ma < slow_ma" },
            "position_sizing": { "type": "fixed", "value": 0.1 },
        })
    }

    fn field_of(record: &Value) -> String {
        parse_definition("s", record).unwrap_err().field
    }

    #[test]
    fn parses_valid_definition() {
        let def = parse_definition("ma", &sample()).unwrap();
        assert_eq!(def.id, "ma");
        assert_eq!(def.name, "MA crossover");
        assert_eq!(def.parameters.get_f64("slow"), Some(20.0));
        assert_eq!(def.indicators.len(), 2);
        assert_eq!(
            def.indicators[1].source,
            IndicatorSource::Builtin("sma".into())
        );
        assert_eq!(def.signals.buy, "fast_ma > slow_ma");
        assert_eq!(def.position_sizing, PositionSizing::Fixed { value: 0.1 });
    }

    #[test]
    fn validate_record_reports_ok() {
        let (ok, message) = validate_record(&sample());
        assert!(ok);
        assert!(message.contains("valid"));
    }

    #[test]
    fn each_required_field_is_named() {
        for field in REQUIRED_FIELDS {
            let mut record = sample();
            record.as_object_mut().unwrap().remove(field);
            let (ok, message) = validate_record(&record);
            assert!(!ok);
            assert!(message.contains(field), "{} not in '{}'", field, message);
        }
    }

    #[test]
    fn missing_position_sizing() {
        let mut record = sample();
        record.as_object_mut().unwrap().remove("position_sizing");
        let err = parse_definition("s", &record).unwrap_err();
        assert_eq!(err, SchemaError::missing("position_sizing"));
    }

    #[test]
    fn sizing_value_out_of_range() {
        for bad in [1.5, 0.0, -0.2] {
            let mut record = sample();
            record["position_sizing"]["value"] = json!(bad);
            let err = parse_definition("s", &record).unwrap_err();
            assert_eq!(err.field, "position_sizing.value");
            assert!(err.reason.contains("(0, 1]"));
        }

        let mut record = sample();
        record["position_sizing"]["value"] = json!(1);
        assert!(parse_definition("s", &record).is_ok());
    }

    #[test]
    fn sizing_type_case_insensitive() {
        let mut record = sample();
        record["position_sizing"]["type"] = json!("FIXED");
        assert!(parse_definition("s", &record).is_ok());

        record["position_sizing"]["type"] = json!("kelly");
        assert_eq!(field_of(&record), "position_sizing.type");
    }

    #[test]
    fn sizing_value_must_be_numeric() {
        let mut record = sample();
        record["position_sizing"]["value"] = json!("half");
        assert_eq!(field_of(&record), "position_sizing.value");
    }

    #[test]
    fn indicators_must_be_list() {
        let mut record = sample();
        record["indicators"] = json!({ "name": "x" });
        assert_eq!(field_of(&record), "indicators");
    }

    #[test]
    fn indicator_missing_params() {
        let mut record = sample();
        record["indicators"][0].as_object_mut().unwrap().remove("params");
        assert_eq!(field_of(&record), "indicators[0].params");
    }

    #[test]
    fn indicator_needs_exactly_one_source() {
        let mut record = sample();
        record["indicators"][0]
            .as_object_mut()
            .unwrap()
            .remove("formula");
        assert_eq!(field_of(&record), "indicators[0].formula");

        let mut record = sample();
        record["indicators"][1]["formula"] = json!("close");
        assert_eq!(field_of(&record), "indicators[1]");
    }

    #[test]
    fn output_collisions_rejected() {
        let mut record = sample();
        record["indicators"][1]["name"] = json!("fast_ma");
        let err = parse_definition("s", &record).unwrap_err();
        assert_eq!(err.field, "indicators[1].name");
        assert!(err.reason.contains("fast_ma"));

        let mut record = sample();
        record["indicators"][0]["name"] = json!("close");
        assert_eq!(field_of(&record), "indicators[0].name");
    }

    #[test]
    fn macd_outputs_count_checked() {
        let mut record = sample();
        record["indicators"][1] = json!({
            "name": "m", "builtin": "macd", "params": {}, "outputs": ["line", "sig"]
        });
        assert_eq!(field_of(&record), "indicators[1].outputs");

        record["indicators"][1]["outputs"] = json!(["m_l", "m_s", "m_h"]);
        let def = parse_definition("s", &record).unwrap();
        assert_eq!(def.indicators[1].output_columns(), vec!["m_l", "m_s", "m_h"]);
    }

    #[test]
    fn invalid_indicator_names() {
        for bad in ["2fast", "fast-ma", "params", "and"] {
            let mut record = sample();
            record["indicators"][0]["name"] = json!(bad);
            assert_eq!(field_of(&record), "indicators[0].name", "{}", bad);
        }
    }

    #[test]
    fn signal_sides_required() {
        let mut record = sample();
        record["signals"].as_object_mut().unwrap().remove("sell");
        let err = parse_definition("s", &record).unwrap_err();
        assert_eq!(err, SchemaError::missing("signals.sell"));
    }

    #[test]
    fn signal_table_shape_rejected() {
        let mut record = sample();
        record["signals"]["buy"] = json!({ "condition": "fast_ma > slow_ma" });
        let err = parse_definition("s", &record).unwrap_err();
        assert_eq!(err.field, "signals.buy");
        assert!(err.reason.contains("single expression"));
    }

    #[test]
    fn parameters_must_be_scalars() {
        let mut record = sample();
        record["parameters"]["windows"] = json!([5, 10]);
        assert_eq!(field_of(&record), "parameters.windows");
    }

    #[test]
    fn non_table_record() {
        let err = parse_definition("s", &json!(["a"])).unwrap_err();
        assert_eq!(err.field, "definition");
    }

    #[test]
    fn description_optional() {
        let mut record = sample();
        record.as_object_mut().unwrap().remove("description");
        let def = parse_definition("s", &record).unwrap();
        assert_eq!(def.description, "");
    }

    #[test]
    fn record_round_trip() {
        let def = parse_definition("ma", &sample()).unwrap();
        let again = parse_definition("ma", &def.to_record()).unwrap();
        assert_eq!(def, again);
    }

    #[test]
    fn split_multi_strategy_document() {
        let doc = json!({ "strategies": { "a": sample(), "b": sample() } });
        let parts = split_document("file", doc);
        let ids: Vec<&str> = parts.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let parts = split_document("file", sample());
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0, "file");
    }
}
