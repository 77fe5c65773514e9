//! Arithmetic over live point values
//!
//! The grammar is deliberately tiny: numbers, point aliases, `+ - * /` and
//! parentheses. Operators do NOT follow mathematical precedence. A flat
//! expression is split on the first operator found in the fixed list
//! `+, -, *, /`; every part is evaluated on its own and the parts are folded
//! left to right with that one operator. Existing test scripts rely on this
//! exact procedure: `2+3*4` is `2 + (3*4)` because `+` is tried first, not
//! because `*` binds tighter.
//!
//! Parentheses are resolved innermost-first: the first `)` and its nearest
//! preceding `(` are evaluated and replaced by their value until none remain.

use std::collections::HashMap;

use crate::common::{Error, Result};
use crate::device::Device;
use crate::points::PointTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    /// Order in which operators split a flat expression
    const SPLIT_ORDER: [Operator; 4] = [Self::Add, Self::Sub, Self::Mul, Self::Div];

    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Self::Add => Some(lhs + rhs),
            Self::Sub => Some(lhs - rhs),
            Self::Mul => Some(lhs * rhs),
            Self::Div if rhs == 0.0 => None,
            Self::Div => Some(lhs / rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Point alias or numeric literal, decided at evaluation time
    Operand(String),
    /// Value of an already evaluated parenthesized group
    Value(f64),
    Op(Operator),
    Open,
    Close,
}

/// Source of variable values for evaluation
pub trait Variables {
    /// Value of a point alias, `None` when the name is not an alias
    fn value(&self, name: &str) -> Option<f64>;
}

impl Variables for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// A tokenized expression, ready to be evaluated repeatedly
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    tokens: Vec<Token>,
}

impl Expression {
    /// Tokenize `text` (without the leading `=` of a script cell)
    pub fn parse(text: &str) -> Result<Self> {
        let source: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if source.is_empty() {
            return Err(Error::expression(text, "empty expression"));
        }

        let mut tokens = Vec::new();
        let mut operand = String::new();
        let mut depth = 0i32;

        for c in source.chars() {
            let token = match c {
                '(' => Some(Token::Open),
                ')' => Some(Token::Close),
                _ => Operator::from_char(c).map(Token::Op),
            };

            match token {
                Some(token) => {
                    if !operand.is_empty() {
                        tokens.push(Token::Operand(std::mem::take(&mut operand)));
                    }
                    match token {
                        Token::Open => depth += 1,
                        Token::Close => depth -= 1,
                        _ => {}
                    }
                    if depth < 0 {
                        return Err(Error::expression(&source, "unmatched ')'"));
                    }
                    tokens.push(token);
                }
                None => operand.push(c),
            }
        }
        if !operand.is_empty() {
            tokens.push(Token::Operand(operand));
        }
        if depth != 0 {
            return Err(Error::expression(&source, "unmatched '('"));
        }

        Ok(Self { source, tokens })
    }

    /// The expression text, whitespace removed
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every bare name or literal referenced by the expression
    pub fn operands(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Operand(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Evaluate against a fixed set of variable values
    pub fn evaluate(&self, vars: &dyn Variables) -> Result<f64> {
        let mut tokens = self.tokens.clone();

        while let Some(close) = tokens.iter().position(|t| *t == Token::Close) {
            let open = tokens[..close]
                .iter()
                .rposition(|t| *t == Token::Open)
                .ok_or_else(|| Error::expression(&self.source, "unmatched ')'"))?;
            let value = self.evaluate_flat(&tokens[open + 1..close], vars)?;
            tokens.splice(open..=close, [Token::Value(value)]);
        }

        self.evaluate_flat(&tokens, vars)
    }

    fn evaluate_flat(&self, tokens: &[Token], vars: &dyn Variables) -> Result<f64> {
        for op in Operator::SPLIT_ORDER {
            if !tokens.contains(&Token::Op(op)) {
                continue;
            }

            let mut result: Option<f64> = None;
            for (i, part) in tokens.split(|t| *t == Token::Op(op)).enumerate() {
                // "-5" splits into ["", "5"]: read the empty head as zero
                let value = if part.is_empty() && i == 0 && op == Operator::Sub {
                    0.0
                } else {
                    self.evaluate_flat(part, vars)?
                };
                result = Some(match result {
                    None => value,
                    Some(acc) => op
                        .apply(acc, value)
                        .ok_or_else(|| Error::expression(&self.source, "division by zero"))?,
                });
            }
            return result.ok_or_else(|| Error::expression(&self.source, "empty operand"));
        }

        match tokens {
            [Token::Value(value)] => Ok(*value),
            [Token::Operand(name)] => self.resolve(name, vars),
            [] => Err(Error::expression(&self.source, "empty operand")),
            _ => Err(Error::expression(&self.source, "missing operator")),
        }
    }

    fn resolve(&self, name: &str, vars: &dyn Variables) -> Result<f64> {
        if let Some(value) = vars.value(name) {
            return Ok(value);
        }
        name.parse::<f64>().map_err(|_| Error::UnresolvedOperand {
            expression: self.source.clone(),
            token: name.to_string(),
        })
    }
}

/// Read the current value of every alias among `names`
///
/// Names that are not point aliases are skipped and left to literal
/// parsing. Binary tokens read from the device count as 1/0.
pub async fn read_variables<'a>(
    names: impl IntoIterator<Item = &'a str>,
    points: &PointTable,
    device: &mut dyn Device,
) -> Result<HashMap<String, f64>> {
    let mut values: HashMap<String, f64> = HashMap::new();

    for name in names {
        if values.contains_key(name) {
            continue;
        }
        let Some(point) = points.by_alias(name) else {
            continue;
        };

        let value = device.read(&point.device_name).await?;
        let number = value.as_number().ok_or_else(|| {
            Error::device_read(
                &point.device_name,
                format!("'{}' has non-numeric value '{}'", name, value),
            )
        })?;
        values.insert(name.to_string(), number);
    }

    Ok(values)
}

/// Read the points an expression references and evaluate it
pub async fn evaluate_live(
    expression: &Expression,
    points: &PointTable,
    device: &mut dyn Device,
) -> Result<f64> {
    let values = read_variables(expression.operands(), points, device).await?;
    expression.evaluate(&values)
}
