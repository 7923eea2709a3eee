//! Engine error taxonomy.
//!
//! Every failure carries a machine-readable [`ErrorKind`] plus a
//! human-readable field or cause.

use std::fmt;

/// A parse error with position information for expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let column = input
            .get(..self.position)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(self.position);
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure while evaluating an indicator formula or signal condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("unbound name '{name}'")]
    Unbound { name: String },

    #[error("operation '{name}' is not allowed")]
    Disallowed { name: String },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("window for '{function}' must be a positive integer, got {value}")]
    InvalidWindow { function: String, value: f64 },

    #[error("'{function}' expects {expected} arguments, got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("'{function}' produced {found} values for {expected} bars")]
    Misaligned {
        function: String,
        expected: usize,
        found: usize,
    },
}

/// A strategy definition failed schema validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid field '{field}': {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "missing required field".to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    Expression,
    Range,
    Data,
    Config,
    Source,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Expression => "expression",
            ErrorKind::Range => "range",
            ErrorKind::Data => "data",
            ErrorKind::Config => "config",
            ErrorKind::Source => "source",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for stratforge.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("range error: {reason}")]
    Range { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    /// An expression failed while running one strategy.
    #[error("strategy '{strategy}' failed in {target}: {source}")]
    Evaluation {
        strategy: String,
        target: String,
        source: ExpressionError,
    },

    #[error("source {origin} failed: {reason}")]
    Source { origin: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Schema(_) => ErrorKind::Schema,
            EngineError::Expression(_) | EngineError::Evaluation { .. } => ErrorKind::Expression,
            EngineError::Range { .. } => ErrorKind::Range,
            EngineError::Data { .. } => ErrorKind::Data,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => ErrorKind::Config,
            EngineError::Source { .. } => ErrorKind::Source,
            EngineError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Source => 3,
            ErrorKind::Schema | ErrorKind::Expression => 4,
            ErrorKind::Range | ErrorKind::Data => 5,
        };
        std::process::ExitCode::from(code)
    }
}
