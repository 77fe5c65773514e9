//! Classification of raw script cells
//!
//! Every cell of a test script is classified exactly once, when the script is
//! loaded. Downstream code only ever sees the typed result.

use serde::Deserialize;
use std::fmt;

use super::comparator::Comparator;
use super::expression::Expression;
use crate::common::{Error, Result};
use crate::points::PointValue;

/// A cell as written in the test script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => f.write_str(t),
        }
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Binary vocabulary accepted in input and expected-output cells
fn binary_token(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "open" | "present" | "on" => Some(true),
        "closed" | "absent" | "off" => Some(false),
        _ => None,
    }
}

/// `name(args)` with a case-insensitive name, returns `args`
fn call_args<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let head = text.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    text.get(name.len()..)?.strip_prefix('(')?.strip_suffix(')')
}

/// A numeric argument that may be computed from live values
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Expression(Expression),
}

impl Operand {
    fn parse(text: &str) -> Result<Self> {
        if let Some(expression) = text.strip_prefix('=') {
            return Ok(Self::Expression(Expression::parse(expression)?));
        }
        text.parse()
            .map(Self::Number)
            .map_err(|_| Error::expression(text, "expected a number or '=expression'"))
    }
}

/// Arguments of `ramp(start;end;rate[;period])`, rate per minute
#[derive(Debug, Clone, PartialEq)]
pub struct RampArgs {
    pub start: Operand,
    pub end: Operand,
    pub rate_per_min: Operand,
    pub period: Option<Operand>,
}

/// Arguments of `periodic(expr[;period])`
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicArgs {
    pub expression: Expression,
    pub period: Option<Operand>,
}

/// What an input cell asks the engine to do with its point
#[derive(Debug, Clone, PartialEq)]
pub enum CellDirective {
    /// Write the value verbatim
    Literal(PointValue),
    /// Write `active` / `inactive`
    Binary(bool),
    /// Write the value of an expression
    Expression(Expression),
    /// Write `start`, then move towards `end` while waiting
    Ramp(RampArgs),
    /// Write the expression, then re-evaluate it while waiting
    Periodic(PeriodicArgs),
}

impl CellDirective {
    pub fn classify(cell: &Cell) -> Result<Self> {
        let text = match cell {
            Cell::Bool(b) => return Ok(Self::Binary(*b)),
            Cell::Number(n) => return Ok(Self::Literal(PointValue::Number(*n))),
            Cell::Text(text) => strip_whitespace(text),
        };

        if let Some(args) = call_args(&text, "ramp") {
            let parts: Vec<&str> = args.split(';').collect();
            if !(3..=4).contains(&parts.len()) {
                return Err(Error::expression(
                    &text,
                    "ramp takes start;end;rate[;period]",
                ));
            }
            return Ok(Self::Ramp(RampArgs {
                start: Operand::parse(parts[0])?,
                end: Operand::parse(parts[1])?,
                rate_per_min: Operand::parse(parts[2])?,
                period: parts.get(3).map(|p| Operand::parse(p)).transpose()?,
            }));
        }

        if let Some(args) = call_args(&text, "periodic") {
            let parts: Vec<&str> = args.split(';').collect();
            if !(1..=2).contains(&parts.len()) {
                return Err(Error::expression(&text, "periodic takes expr[;period]"));
            }
            let expression = parts[0].strip_prefix('=').unwrap_or(parts[0]);
            return Ok(Self::Periodic(PeriodicArgs {
                expression: Expression::parse(expression)?,
                period: parts.get(1).map(|p| Operand::parse(p)).transpose()?,
            }));
        }

        if let Some(expression) = text.strip_prefix('=') {
            return Ok(Self::Expression(Expression::parse(expression)?));
        }

        if let Some(on) = binary_token(&text) {
            return Ok(Self::Binary(on));
        }

        Ok(Self::Literal(PointValue::Text(text)))
    }
}

/// What an expected-output cell requires of the observed value
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Anything goes
    Any,
    /// Compare against this point's output in the previous step
    RelativeToLast(Comparator),
    /// Within tolerance of an expression evaluated after the wait
    Expression(Expression),
    /// Within tolerance of a fixed value (percent points are scaled)
    Value(f64),
}

impl Expectation {
    pub fn classify(cell: &Cell) -> Result<Self> {
        let text = match cell {
            Cell::Bool(b) => return Ok(Self::Value(if *b { 1.0 } else { 0.0 })),
            Cell::Number(n) => return Ok(Self::Value(*n)),
            Cell::Text(text) => strip_whitespace(text),
        };

        if text.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }

        if let Some(symbol) = text.strip_suffix("last") {
            return Comparator::parse(symbol)
                .map(Self::RelativeToLast)
                .ok_or_else(|| {
                    Error::Script(format!(
                        "'{}' needs one of >, >=, <, <=, == before 'last'",
                        text
                    ))
                });
        }

        if let Some(expression) = text.strip_prefix('=') {
            return Ok(Self::Expression(Expression::parse(expression)?));
        }

        if let Some(on) = binary_token(&text) {
            return Ok(Self::Value(if on { 1.0 } else { 0.0 }));
        }

        text.parse().map(Self::Value).map_err(|_| {
            Error::Script(format!(
                "unsupported expected value '{}' (use a number, Any, =expr, <op>last or on/off)",
                text
            ))
        })
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::RelativeToLast(op) => write!(f, "{}last", op),
            Self::Expression(expr) => write!(f, "={}", expr.source()),
            Self::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Early exit of a step's wait phase
#[derive(Debug, Clone, PartialEq)]
pub struct WakeClause {
    /// Device name of the watched point
    pub variable: String,
    pub comparator: Comparator,
    /// In script units (percent points compare in 0..1)
    pub threshold: f64,
}

impl WakeClause {
    /// Parse a wake threshold: a bare number (meaning `>=`) or
    /// `"<op><number>[%]"`, where `%` divides the number by 100.
    pub fn parse(variable: &str, value: &Cell) -> Result<Self> {
        let (comparator, threshold) = match value {
            Cell::Number(n) => (Comparator::Ge, *n),
            Cell::Bool(b) => (Comparator::Ge, if *b { 1.0 } else { 0.0 }),
            Cell::Text(text) => {
                let text = strip_whitespace(text);
                let (comparator, rest) =
                    Comparator::split_prefix(&text).unwrap_or((Comparator::Ge, text.as_str()));

                let (number, scale) = match rest.strip_suffix('%') {
                    Some(number) => (number, 100.0),
                    None => (rest, 1.0),
                };
                let threshold: f64 = number.parse().map_err(|_| {
                    Error::condition_config(
                        variable,
                        format!("'{}' is not '<op><number>[%]'", text),
                    )
                })?;
                (comparator, threshold / scale)
            }
        };

        Ok(Self {
            variable: variable.to_string(),
            comparator,
            threshold,
        })
    }

    pub fn is_satisfied(&self, value: f64) -> bool {
        self.comparator.holds(value, self.threshold)
    }
}
