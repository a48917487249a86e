// SPDX-License-Identifier: MIT OR Apache-2.0
//! Enable expressions.
//!
//! Timeline objects express their timing as numbers or as small arithmetic
//! expressions over other objects, e.g. `#intro.end + 500`. Expressions are
//! kept as a typed tree so that id rewriting is token-exact: renaming `#a`
//! never touches `#ab`.

use crate::error::ExpressionError;
use crate::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&` (logical and)
    And,
    /// `|` (logical or)
    Or,
}

impl Operator {
    /// Source symbol
    pub fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Rem => '%',
            Self::And => '&',
            Self::Or => '|',
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Add | Self::Sub => 3,
            Self::Mul | Self::Div | Self::Rem => 4,
        }
    }

    fn from_char(ch: char) -> Option<Self> {
        Some(match ch {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '%' => Self::Rem,
            '&' => Self::And,
            '|' => Self::Or,
            _ => return None,
        })
    }
}

/// Property of a referenced object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefProperty {
    /// Start time (the default when no property is written)
    #[default]
    Start,
    /// End time
    End,
    /// Duration
    Duration,
}

impl RefProperty {
    /// Source spelling
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Duration => "duration",
        }
    }
}

impl FromStr for RefProperty {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "duration" => Ok(Self::Duration),
            other => Err(ExpressionError::UnknownProperty(other.to_string())),
        }
    }
}

/// Reference to another object's timing (`#id.end`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Referenced object
    pub object: ObjectId,
    /// Referenced property
    pub property: RefProperty,
}

impl Reference {
    /// Create a reference
    pub fn new(object: impl Into<ObjectId>, property: RefProperty) -> Self {
        Self {
            object: object.into(),
            property,
        }
    }
}

/// A parsed enable expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression", into = "RawExpression")]
pub enum Expression {
    /// Numeric literal (milliseconds)
    Number(f64),
    /// Reference to another object
    Reference(Reference),
    /// Logical negation
    Invert(Box<Expression>),
    /// Binary operation
    Binary {
        /// Left operand
        left: Box<Expression>,
        /// Operator
        op: Operator,
        /// Right operand
        right: Box<Expression>,
    },
}

impl Expression {
    /// Parse an expression string
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression(0)?;
        if let Some((position, _)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::UnexpectedToken { position: *position });
        }
        Ok(expr)
    }

    /// Create a reference expression
    pub fn reference(object: impl Into<ObjectId>, property: RefProperty) -> Self {
        Self::Reference(Reference::new(object, property))
    }

    /// Combine two expressions
    pub fn binary(left: Expression, op: Operator, right: Expression) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Literal value, if this is a plain number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// All references in this expression, left to right
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Number(_) => {}
            Self::Reference(r) => out.push(r),
            Self::Invert(inner) => inner.collect_references(out),
            Self::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
        }
    }

    /// Replace referenced object ids found in `map`, leaving others untouched
    pub fn rewrite_references(&mut self, map: &HashMap<ObjectId, ObjectId>) {
        match self {
            Self::Number(_) => {}
            Self::Reference(r) => {
                if let Some(new_id) = map.get(&r.object) {
                    r.object = new_id.clone();
                }
            }
            Self::Invert(inner) => inner.rewrite_references(map),
            Self::Binary { left, right, .. } => {
                left.rewrite_references(map);
                right.rewrite_references(map);
            }
        }
    }

    /// Evaluate numerically, resolving references through `lookup`.
    ///
    /// Logical operators and unresolved references yield `None`.
    pub fn evaluate<F>(&self, lookup: &mut F) -> Option<f64>
    where
        F: FnMut(&Reference) -> Option<f64>,
    {
        match self {
            Self::Number(n) => Some(*n),
            Self::Reference(r) => lookup(r),
            Self::Invert(_) => None,
            Self::Binary { left, op, right } => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                match op {
                    Operator::Add => Some(l + r),
                    Operator::Sub => Some(l - r),
                    Operator::Mul => Some(l * r),
                    Operator::Div if r != 0.0 => Some(l / r),
                    Operator::Rem if r != 0.0 => Some(l % r),
                    Operator::Div | Operator::Rem | Operator::And | Operator::Or => None,
                }
            }
        }
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write_number(f, *n),
            Self::Reference(r) => write!(f, "#{}.{}", r.object, r.property.name()),
            Self::Invert(inner) => match inner.as_ref() {
                Self::Binary { .. } => write!(f, "!({inner})"),
                _ => write!(f, "!{inner}"),
            },
            Self::Binary { left, op, right } => {
                write_operand(f, left, op.precedence(), false)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, op.precedence(), true)
            }
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    expr: &Expression,
    parent: u8,
    right_side: bool,
) -> fmt::Result {
    let wrap = match expr {
        Expression::Binary { op, .. } => {
            op.precedence() < parent || (right_side && op.precedence() == parent)
        }
        _ => false,
    };
    if wrap {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

/// Wire form: plain numbers stay numbers, everything else is a string.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawExpression {
    Number(f64),
    Text(String),
}

impl TryFrom<RawExpression> for Expression {
    type Error = ExpressionError;

    fn try_from(raw: RawExpression) -> Result<Self, Self::Error> {
        match raw {
            RawExpression::Number(n) => Ok(Self::Number(n)),
            RawExpression::Text(text) => Self::parse(&text),
        }
    }
}

impl From<Expression> for RawExpression {
    fn from(expr: Expression) -> Self {
        match expr {
            Expression::Number(n) => Self::Number(n),
            other => Self::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(Reference),
    Op(Operator),
    Not,
    Open,
    Close,
}

fn is_id_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut literal = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    literal.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
            tokens.push((position, Token::Number(value)));
            continue;
        }

        if ch == '#' {
            chars.next();
            let mut id = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if is_id_char(c) {
                    id.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if id.is_empty() {
                return Err(ExpressionError::MissingReference { position });
            }
            let mut property = RefProperty::Start;
            if matches!(chars.peek(), Some(&(_, '.'))) {
                chars.next();
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphabetic() {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                property = name.parse()?;
            }
            tokens.push((position, Token::Reference(Reference::new(id, property))));
            continue;
        }

        let token = match ch {
            '(' => Token::Open,
            ')' => Token::Close,
            '!' => Token::Not,
            other => match Operator::from_char(other) {
                Some(op) => Token::Op(op),
                None => return Err(ExpressionError::UnexpectedChar { ch, position }),
            },
        };
        chars.next();
        tokens.push((position, token));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_operator(&self) -> Option<Operator> {
        match self.tokens.get(self.pos) {
            Some((_, Token::Op(op))) => Some(*op),
            _ => None,
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expression, ExpressionError> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.expression(op.precedence() + 1)?;
            left = Expression::binary(left, op, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ExpressionError> {
        let (position, token) = self.next().ok_or(ExpressionError::UnexpectedEnd)?;
        match token {
            Token::Number(n) => Ok(Expression::Number(n)),
            Token::Reference(r) => Ok(Expression::Reference(r)),
            Token::Not => Ok(Expression::Invert(Box::new(self.unary()?))),
            Token::Op(Operator::Add) => self.unary(),
            Token::Op(Operator::Sub) => Ok(match self.unary()? {
                Expression::Number(n) => Expression::Number(-n),
                operand => Expression::binary(Expression::Number(0.0), Operator::Sub, operand),
            }),
            Token::Open => {
                let inner = self.expression(0)?;
                match self.next() {
                    Some((_, Token::Close)) => Ok(inner),
                    Some((position, _)) => Err(ExpressionError::UnexpectedToken { position }),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Token::Op(_) | Token::Close => Err(ExpressionError::UnexpectedToken { position }),
        }
    }
}
