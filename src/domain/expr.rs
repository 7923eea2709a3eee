//! Expression AST for indicator formulas and signal conditions.
//!
//! - `Expr`: literals, column and parameter references, operators, calls
//! - `BinaryOp`: arithmetic, comparison and boolean combinators
//! - `Function`: the whitelist of callable built-ins

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    /// A bar column or a derived column attached earlier in the run.
    Column(String),
    /// `params.<name>`
    Param(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Whitelisted built-in functions. Every function looks only at the
/// current and earlier bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    RollingMean,
    RollingStd,
    EwmMean,
    Shift,
    Sma,
    Ema,
    Rsi,
    MacdLine,
    MacdSignal,
    MacdHist,
}

impl Function {
    pub const ALL: [Function; 10] = [
        Function::RollingMean,
        Function::RollingStd,
        Function::EwmMean,
        Function::Shift,
        Function::Sma,
        Function::Ema,
        Function::Rsi,
        Function::MacdLine,
        Function::MacdSignal,
        Function::MacdHist,
    ];

    pub fn from_name(name: &str) -> Option<Function> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::RollingMean => "rolling_mean",
            Function::RollingStd => "rolling_std",
            Function::EwmMean => "ewm_mean",
            Function::Shift => "shift",
            Function::Sma => "sma",
            Function::Ema => "ema",
            Function::Rsi => "rsi",
            Function::MacdLine => "macd_line",
            Function::MacdSignal => "macd_signal",
            Function::MacdHist => "macd_hist",
        }
    }

    /// Number of arguments, including the input series.
    pub fn arity(&self) -> usize {
        match self {
            Function::MacdLine => 3,
            Function::MacdSignal | Function::MacdHist => 4,
            _ => 2,
        }
    }
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Param(name) => write!(f, "params.{}", name),
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Not(inner) => write!(f, "not {}", inner),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
