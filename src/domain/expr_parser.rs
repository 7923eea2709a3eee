//! Expression parser.
//!
//! Recursive descent parser for indicator formulas and signal conditions.
//! Converts text to an [`Expr`] with messages that carry the character
//! offset and the offending token.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison (not
//! chainable), `+ -`, `* /`, unary minus, primary.
//!
//! Nesting (parentheses, call arguments, prefix operators and operator
//! chains) is capped at [`MAX_DEPTH`] so parsing and evaluation stay
//! within a bounded stack.

use crate::domain::error::ParseError;
use crate::domain::expr::{BinaryOp, Expr};

const PARAMS_PREFIX: &str = "params";

/// Deepest expression tree the parser accepts.
pub const MAX_DEPTH: usize = 100;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self, at: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply", at));
        }
        Ok(())
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(
                format!("expected '{}', found '{}'", expected, ch),
                self.pos,
            )),
            None => Err(self.error(
                format!("expected '{}', found end of input", expected),
                self.pos,
            )),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .map(is_ident_char)
                .unwrap_or(false)
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_ident(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(self.error(format!("expected identifier, found '{}'", ch), start)),
            None => return Err(self.error("expected identifier, found end of input", start)),
        }
        while let Some(ch) = self.peek() {
            if is_ident_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(self.error("expected number", start));
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            let mut exp_digits = 0;
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    exp_digits += 1;
                    self.advance();
                } else {
                    break;
                }
            }
            if exp_digits == 0 {
                return Err(self.error("malformed exponent", mark));
            }
        }

        if self.peek().map(is_ident_char).unwrap_or(false) {
            return Err(self.error(
                format!("unexpected '{}' after number", self.peek().unwrap_or(' ')),
                self.pos,
            ));
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number: {}", num_str), start))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            let mark = self.pos;
            if self.consume_keyword("or") {
                self.descend(mark)?;
                let right = self.parse_and()?;
                left = Expr::binary(BinaryOp::Or, left, right);
            } else {
                self.depth = depth;
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        loop {
            self.skip_whitespace();
            let mark = self.pos;
            if self.consume_keyword("and") {
                self.descend(mark)?;
                let right = self.parse_not()?;
                left = Expr::binary(BinaryOp::And, left, right);
            } else {
                self.depth = depth;
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let mark = self.pos;
        if self.consume_keyword("not") {
            self.descend(mark)?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn consume_comparison_op(&mut self) -> Option<BinaryOp> {
        self.skip_whitespace();
        if self.consume_exact("<=") {
            Some(BinaryOp::Le)
        } else if self.consume_exact(">=") {
            Some(BinaryOp::Ge)
        } else if self.consume_exact("==") {
            Some(BinaryOp::Eq)
        } else if self.consume_exact("<") {
            Some(BinaryOp::Lt)
        } else if self.consume_exact(">") {
            Some(BinaryOp::Gt)
        } else {
            None
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let Some(op) = self.consume_comparison_op() else {
            return Ok(left);
        };
        let right = self.parse_additive()?;

        let mark = self.pos;
        if self.consume_comparison_op().is_some() {
            return Err(self.error("comparisons cannot be chained", mark));
        }
        Ok(Expr::binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => {
                    self.depth = depth;
                    return Ok(left);
                }
            };
            self.descend(self.pos)?;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => {
                    self.depth = depth;
                    return Ok(left);
                }
            };
            self.descend(self.pos)?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            self.descend(self.pos)?;
            self.advance();
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        match self.peek() {
            None => Err(self.error("expected expression, found end of input", start)),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => Ok(Expr::Number(self.parse_number()?)),
            Some('(') => {
                self.descend(start)?;
                self.advance();
                let inner = self.parse_or()?;
                self.expect_char(')')?;
                self.depth -= 1;
                Ok(inner)
            }
            Some('"') | Some('\'') => Err(self.error("string literals are not supported", start)),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.parse_name_or_call(),
            Some(ch) => Err(self.error(format!("unexpected '{}'", ch), start)),
        }
    }

    fn parse_name_or_call(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let ident = self.parse_ident()?;

        match ident {
            "true" => return Ok(Expr::Bool(true)),
            "false" => return Ok(Expr::Bool(false)),
            "and" | "or" | "not" => {
                return Err(self.error(format!("unexpected keyword '{}'", ident), start));
            }
            _ => {}
        }

        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.descend(start)?;
            self.advance();
            let args = self.parse_arguments()?;
            self.depth -= 1;
            return Ok(Expr::Call {
                name: ident.to_string(),
                args,
            });
        }

        let mut segments = vec![ident];
        while self.peek() == Some('.') {
            self.advance();
            segments.push(self.parse_ident()?);
        }

        if segments[0] == PARAMS_PREFIX {
            return match segments.as_slice() {
                [_, name] => Ok(Expr::Param(name.to_string())),
                [_] => Err(self.error("expected '.<name>' after 'params'", self.pos)),
                _ => Err(self.error("parameter references take a single name", start)),
            };
        }

        Ok(Expr::Column(segments.join(".")))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(args);
        }

        args.push(self.parse_or()?);
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                return Ok(args);
            }
            self.expect_char(',')?;
            args.push(self.parse_or()?);
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if let Some(ch) = self.peek() {
            let message = if ch == '=' {
                "unexpected '=' (equality is '==')".to_string()
            } else {
                format!("unexpected input after expression: '{}'", self.remaining())
            };
            return Err(self.error(message, self.pos));
        }
        Ok(expr)
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}
