//! Expression evaluation engine.
//!
//! Evaluates an [`Expr`] against a [`Frame`] (bar columns plus derived
//! columns attached during a run) and a [`ParameterSet`].
//!
//! # Evaluation Semantics
//!
//! - Scalars broadcast against series; the result of a whole expression is
//!   always one value per bar
//! - Arithmetic on NaN yields NaN; any comparison involving NaN is `false`
//! - `and`/`or`/`not` require boolean operands, arithmetic and comparison
//!   require numeric ones
//! - Only the functions in [`Function`] may be called; window arguments
//!   must be positive integer scalars
//! - Evaluation never mutates the frame

use crate::domain::bar::{BAR_COLUMNS, Bar};
use crate::domain::error::ExpressionError;
use crate::domain::expr::{BinaryOp, Expr, Function};
use crate::domain::expr_parser::parse_expression;
use crate::domain::indicator::{ema, macd, rsi, sma, stddev, window_from_f64};
use crate::domain::params::{ParamValue, ParameterSet};
use crate::domain::series::Column;
use std::collections::BTreeMap;

/// Bar columns plus the derived-column namespace of a single run.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    bars: &'a [Bar],
    derived: BTreeMap<String, Column>,
}

impl<'a> Frame<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self {
            bars,
            derived: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }

    pub fn has_column(&self, name: &str) -> bool {
        BAR_COLUMNS.contains(&name) || self.derived.contains_key(name)
    }

    /// Look up a bar or derived column by name.
    pub fn column(&self, name: &str) -> Option<Column> {
        if BAR_COLUMNS.contains(&name) {
            let values = self
                .bars
                .iter()
                .map(|b| b.field(name).unwrap_or(f64::NAN))
                .collect();
            return Some(Column::Numeric(values));
        }
        self.derived.get(name).cloned()
    }

    /// Attach a derived column. Later attachments under the same name replace earlier ones.
    pub fn attach(&mut self, name: impl Into<String>, column: Column) {
        debug_assert_eq!(column.len(), self.len());
        self.derived.insert(name.into(), column);
    }

    pub fn derived(&self) -> &BTreeMap<String, Column> {
        &self.derived
    }

    pub fn into_derived(self) -> BTreeMap<String, Column> {
        self.derived
    }
}

/// Evaluate `expr`, broadcasting a scalar result to one value per bar.
pub fn evaluate(
    expr: &Expr,
    frame: &Frame<'_>,
    params: &ParameterSet,
) -> Result<Column, ExpressionError> {
    let value = Evaluator { frame, params }.eval(expr)?;
    Ok(value.into_column(frame.len()))
}

/// Evaluate a numeric expression (indicator formula).
pub fn evaluate_numeric(
    expr: &Expr,
    frame: &Frame<'_>,
    params: &ParameterSet,
) -> Result<Vec<f64>, ExpressionError> {
    match evaluate(expr, frame, params)? {
        Column::Numeric(values) => Ok(values),
        Column::Boolean(_) => Err(ExpressionError::TypeMismatch {
            context: format!("formula '{}'", expr),
            expected: "numeric series",
            found: "boolean series",
        }),
    }
}

/// Evaluate a boolean expression (signal condition).
pub fn evaluate_condition(
    expr: &Expr,
    frame: &Frame<'_>,
    params: &ParameterSet,
) -> Result<Vec<bool>, ExpressionError> {
    match evaluate(expr, frame, params)? {
        Column::Boolean(values) => Ok(values),
        Column::Numeric(_) => Err(ExpressionError::TypeMismatch {
            context: format!("condition '{}'", expr),
            expected: "boolean series",
            found: "numeric series",
        }),
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_str(
    input: &str,
    frame: &Frame<'_>,
    params: &ParameterSet,
) -> Result<Column, ExpressionError> {
    let expr = parse_expression(input)?;
    evaluate(&expr, frame, params)
}

enum Lane<T> {
    Scalar(T),
    Series(Vec<T>),
}

fn map_lane<T, U>(lane: Lane<T>, f: impl Fn(T) -> U) -> Lane<U> {
    match lane {
        Lane::Scalar(a) => Lane::Scalar(f(a)),
        Lane::Series(xs) => Lane::Series(xs.into_iter().map(f).collect()),
    }
}

fn zip_with<T: Copy, U>(left: Lane<T>, right: Lane<T>, f: impl Fn(T, T) -> U) -> Lane<U> {
    match (left, right) {
        (Lane::Scalar(a), Lane::Scalar(b)) => Lane::Scalar(f(a, b)),
        (Lane::Scalar(a), Lane::Series(ys)) => Lane::Series(ys.into_iter().map(|b| f(a, b)).collect()),
        (Lane::Series(xs), Lane::Scalar(b)) => Lane::Series(xs.into_iter().map(|a| f(a, b)).collect()),
        (Lane::Series(xs), Lane::Series(ys)) => {
            Lane::Series(xs.into_iter().zip(ys).map(|(a, b)| f(a, b)).collect())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
    Numeric(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Numeric(_) => "numeric series",
            Value::Boolean(_) => "boolean series",
        }
    }

    fn into_numbers(self, context: &str) -> Result<Lane<f64>, ExpressionError> {
        match self {
            Value::Number(n) => Ok(Lane::Scalar(n)),
            Value::Numeric(v) => Ok(Lane::Series(v)),
            other => Err(ExpressionError::TypeMismatch {
                context: context.to_string(),
                expected: "number",
                found: other.type_name(),
            }),
        }
    }

    fn into_flags(self, context: &str) -> Result<Lane<bool>, ExpressionError> {
        match self {
            Value::Bool(b) => Ok(Lane::Scalar(b)),
            Value::Boolean(v) => Ok(Lane::Series(v)),
            other => Err(ExpressionError::TypeMismatch {
                context: context.to_string(),
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }

    fn into_column(self, len: usize) -> Column {
        match self {
            Value::Number(n) => Column::Numeric(vec![n; len]),
            Value::Bool(b) => Column::Boolean(vec![b; len]),
            Value::Numeric(v) => Column::Numeric(v),
            Value::Boolean(v) => Column::Boolean(v),
        }
    }
}

impl From<Lane<f64>> for Value {
    fn from(lane: Lane<f64>) -> Self {
        match lane {
            Lane::Scalar(n) => Value::Number(n),
            Lane::Series(v) => Value::Numeric(v),
        }
    }
}

impl From<Lane<bool>> for Value {
    fn from(lane: Lane<bool>) -> Self {
        match lane {
            Lane::Scalar(b) => Value::Bool(b),
            Lane::Series(v) => Value::Boolean(v),
        }
    }
}

impl From<Column> for Value {
    fn from(column: Column) -> Self {
        match column {
            Column::Numeric(v) => Value::Numeric(v),
            Column::Boolean(v) => Value::Boolean(v),
        }
    }
}

struct Evaluator<'f, 'a> {
    frame: &'f Frame<'a>,
    params: &'f ParameterSet,
}

impl Evaluator<'_, '_> {
    fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Column(name) => self
                .frame
                .column(name)
                .map(Value::from)
                .ok_or_else(|| ExpressionError::Unbound { name: name.clone() }),
            Expr::Param(name) => self.param(name),
            Expr::Neg(inner) => {
                let lane = self.eval(inner)?.into_numbers("unary '-'")?;
                Ok(map_lane(lane, |a: f64| -a).into())
            }
            Expr::Not(inner) => {
                let lane = self.eval(inner)?.into_flags("'not'")?;
                Ok(map_lane(lane, |a: bool| !a).into())
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, l, r)
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn param(&self, name: &str) -> Result<Value, ExpressionError> {
        match self.params.get(name) {
            None => Err(ExpressionError::Unbound {
                name: format!("params.{}", name),
            }),
            Some(ParamValue::Str(_)) => Err(ExpressionError::TypeMismatch {
                context: format!("params.{}", name),
                expected: "number",
                found: "string",
            }),
            Some(value) => Ok(Value::Number(value.as_f64().unwrap_or(f64::NAN))),
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<Value, ExpressionError> {
        let function = Function::from_name(name).ok_or_else(|| ExpressionError::Disallowed {
            name: name.to_string(),
        })?;
        if args.len() != function.arity() {
            return Err(ExpressionError::Arity {
                function: name.to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }

        let input = match self.eval(&args[0])?.into_numbers(&format!("first argument of {}", name))? {
            Lane::Scalar(n) => vec![n; self.frame.len()],
            Lane::Series(v) => v,
        };
        let windows = args[1..]
            .iter()
            .map(|arg| self.window(function, arg))
            .collect::<Result<Vec<usize>, ExpressionError>>()?;

        let out = match function {
            Function::RollingMean | Function::Sma => sma::rolling_mean(&input, windows[0]),
            Function::RollingStd => stddev::rolling_std(&input, windows[0]),
            Function::EwmMean | Function::Ema => ema::ewm_mean(&input, windows[0]),
            Function::Shift => shift(&input, windows[0]),
            Function::Rsi => rsi::rsi(&input, windows[0]),
            Function::MacdLine => macd::macd_line(&input, windows[0], windows[1]),
            Function::MacdSignal => macd::macd(&input, windows[0], windows[1], windows[2]).signal,
            Function::MacdHist => macd::macd(&input, windows[0], windows[1], windows[2]).histogram,
        };
        Ok(Value::Numeric(out))
    }

    fn window(&self, function: Function, arg: &Expr) -> Result<usize, ExpressionError> {
        match self.eval(arg)? {
            Value::Number(n) => window_from_f64(n, function.name()),
            other => Err(ExpressionError::TypeMismatch {
                context: format!("window argument of {}", function.name()),
                expected: "number",
                found: other.type_name(),
            }),
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    let context = format!("operator '{}'", op.symbol());
    let value: Value = match op {
        BinaryOp::And | BinaryOp::Or => {
            let l = left.into_flags(&context)?;
            let r = right.into_flags(&context)?;
            if op == BinaryOp::And {
                zip_with(l, r, |a, b| a && b).into()
            } else {
                zip_with(l, r, |a, b| a || b).into()
            }
        }
        _ => {
            let l = left.into_numbers(&context)?;
            let r = right.into_numbers(&context)?;
            match op {
                BinaryOp::Add => zip_with(l, r, |a, b| a + b).into(),
                BinaryOp::Sub => zip_with(l, r, |a, b| a - b).into(),
                BinaryOp::Mul => zip_with(l, r, |a, b| a * b).into(),
                BinaryOp::Div => zip_with(l, r, |a, b| a / b).into(),
                BinaryOp::Lt => zip_with(l, r, |a, b| a < b).into(),
                BinaryOp::Le => zip_with(l, r, |a, b| a <= b).into(),
                BinaryOp::Gt => zip_with(l, r, |a, b| a > b).into(),
                BinaryOp::Ge => zip_with(l, r, |a, b| a >= b).into(),
                _ => zip_with(l, r, |a, b| a == b).into(),
            }
        }
    };
    Ok(value)
}

/// Lag a series by `n` bars; the first `n` outputs are NaN.
pub fn shift(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if n < values.len() {
        out[n..].copy_from_slice(&values[..values.len() - n]);
    }
    out
}
