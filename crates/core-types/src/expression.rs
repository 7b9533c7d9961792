use crate::error::EvalError;
use rust_decimal::Decimal;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::ops;

/// A scalar value flowing through expressions and service results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Value {
    Number(Decimal),
    Text(String),
    Bool(bool),
    #[default]
    Missing,
}

impl Value {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::Missing => "missing",
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Missing => f.write_str("NA"),
        }
    }
}

// Service payloads carry numbers, strings, booleans and nulls. Floats are converted
// through their shortest textual form so 0.1 stays 0.1.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number, string, boolean or null")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Number(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Number(Decimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                if !v.is_finite() {
                    return Ok(Value::Missing);
                }
                v.to_string()
                    .parse::<Decimal>()
                    .or_else(|_| Decimal::try_from(v))
                    .map(Value::Number)
                    .map_err(|_| E::custom(format!("number {v} is outside the decimal range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Missing)
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Missing)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Value::deserialize(deserializer)
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => " AND ",
            BinaryOp::Or => " OR ",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Eq
            | BinaryOp::Ne => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div => 5,
        }
    }
}

/// An opaque query expression for the external data service.
///
/// Expressions are built from typed parts and rendered to the service's textual form
/// through `Display`. The rendering is deterministic: the same tree always produces the
/// same text. Parts that the service alone understands (`Formula`, `Call`) are carried
/// verbatim; everything else can also be evaluated locally with [`Expression::eval`],
/// which is how classification and filter logic is checked without a network round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Literal(Value),
    /// A name bound earlier in the same query (a `let` binding or a service field).
    Reference(String),
    /// Service formula text produced by a `FormulaTemplate`.
    Formula(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Not(Box<Expression>),
    If {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    In {
        value: Box<Expression>,
        set: Vec<Value>,
    },
    Call {
        function: String,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn number(value: impl Into<Decimal>) -> Self {
        Expression::Literal(Value::Number(value.into()))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expression::Literal(Value::Text(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Value::Bool(value))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Expression::Reference(name.into())
    }

    pub fn formula(text: impl Into<String>) -> Self {
        Expression::Formula(text.into())
    }

    pub fn call(function: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            function: function.into(),
            args,
        }
    }

    pub fn if_then_else(condition: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::If {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    fn binary(self, op: BinaryOp, rhs: Expression) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn gt(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn lt(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn equals(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn and(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expression) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn is_in(self, set: Vec<Value>) -> Self {
        Expression::In {
            value: Box::new(self),
            set,
        }
    }

    /// Conjunction of all parts; the universally true literal when there are none.
    pub fn all(parts: impl IntoIterator<Item = Expression>) -> Self {
        parts
            .into_iter()
            .reduce(|acc, part| acc.and(part))
            .unwrap_or_else(|| Expression::boolean(true))
    }

    /// Sum of all parts; zero when there are none.
    pub fn sum(parts: impl IntoIterator<Item = Expression>) -> Self {
        parts
            .into_iter()
            .reduce(|acc, part| acc + part)
            .unwrap_or_else(|| Expression::number(Decimal::ZERO))
    }

    /// Evaluates the expression against named values.
    ///
    /// `Missing` propagates through arithmetic, compares as `false`, and sends an `If`
    /// to its `otherwise` branch.
    pub fn eval(&self, env: &dyn Environment) -> Result<Value, EvalError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Reference(name) => env
                .lookup(name)
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            Expression::Formula(_) | Expression::Call { .. } => {
                Err(EvalError::Opaque(self.to_string()))
            }
            Expression::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(env)?;
                let rhs = rhs.eval(env)?;
                apply_binary(*op, &lhs, &rhs)
            }
            Expression::Not(inner) => match inner.eval(env)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Missing => Ok(Value::Missing),
                other => Err(EvalError::TypeMismatch {
                    op: "not",
                    lhs: other.type_name(),
                    rhs: "none",
                }),
            },
            Expression::If {
                condition,
                then,
                otherwise,
            } => match condition.eval(env)? {
                Value::Bool(true) => then.eval(env),
                Value::Bool(false) | Value::Missing => otherwise.eval(env),
                other => Err(EvalError::TypeMismatch {
                    op: "if",
                    lhs: other.type_name(),
                    rhs: "none",
                }),
            },
            Expression::In { value, set } => {
                let value = value.eval(env)?;
                Ok(Value::Bool(!value.is_missing() && set.contains(&value)))
            }
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol().trim(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    BinaryOp::Sub => a.checked_sub(*b),
                    BinaryOp::Mul => a.checked_mul(*b),
                    _ => a.checked_div(*b),
                };
                Ok(result.map(Value::Number).unwrap_or(Value::Missing))
            }
            (Value::Missing, Value::Number(_) | Value::Missing)
            | (Value::Number(_), Value::Missing) => Ok(Value::Missing),
            _ => Err(mismatch()),
        },
        BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Eq
        | BinaryOp::Ne => {
            let ordering = match (lhs, rhs) {
                (Value::Missing, _) | (_, Value::Missing) => return Ok(Value::Bool(false)),
                (Value::Number(a), Value::Number(b)) => a.cmp(b),
                (Value::Text(a), Value::Text(b)) => a.cmp(b),
                (Value::Bool(a), Value::Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                    a.cmp(b)
                }
                _ => return Err(mismatch()),
            };
            let holds = match op {
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Eq => ordering.is_eq(),
                _ => ordering.is_ne(),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::And | BinaryOp::Or => {
            let truth = |v: &Value| match v {
                Value::Bool(b) => Ok(*b),
                Value::Missing => Ok(false),
                _ => Err(mismatch()),
            };
            let (a, b) = (truth(lhs)?, truth(rhs)?);
            Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b }))
        }
    }
}

impl ops::Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl ops::Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl ops::Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl ops::Div for Expression {
    type Output = Expression;

    fn div(self, rhs: Expression) -> Expression {
        self.binary(BinaryOp::Div, rhs)
    }
}

impl ops::Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        Expression::Not(Box::new(self))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Reference(name) => f.write_str(name),
            Expression::Formula(text) => f.write_str(text),
            Expression::Binary { op, lhs, rhs } => {
                write_operand(f, lhs, *op, false)?;
                f.write_str(op.symbol())?;
                write_operand(f, rhs, *op, true)
            }
            Expression::Not(inner) => write!(f, "not({inner})"),
            Expression::If {
                condition,
                then,
                otherwise,
            } => write!(f, "if({condition},{then},{otherwise})"),
            Expression::In { value, set } => {
                write!(f, "in({value},[")?;
                write_joined(f, set)?;
                f.write_str("])")
            }
            Expression::Call { function, args } => {
                write!(f, "{function}(")?;
                write_joined(f, args)?;
                f.write_str(")")
            }
        }
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    operand: &Expression,
    parent: BinaryOp,
    right_side: bool,
) -> fmt::Result {
    let needs_parens = match operand {
        Expression::Binary { op, .. } => {
            op.precedence() < parent.precedence()
                || (right_side && op.precedence() == parent.precedence())
        }
        // Formula text is arbitrary service syntax and may contain its own operators.
        Expression::Formula(_) => true,
        _ => false,
    };
    if needs_parens {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Named values an expression can be evaluated against.
pub trait Environment {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl<S: BuildHasher> Environment for HashMap<String, Value, S> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Environment for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}
