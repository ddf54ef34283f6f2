//! Conditional-logging predicates.
//!
//! A closed expression language over a call's named arguments: variables are
//! written `#name`, the call target is `#this` (alias `#root`), map values
//! expose properties with `.field`. Supported operators are comparisons
//! (`== != < <= > >=` or `eq ne lt le gt ge`) and boolean logic
//! (`&& || !` or `and or not`).
//!
//! Evaluation is fail-closed: any parse, type or runtime problem is reported
//! through `tracing` and the predicate counts as false.

mod lexer;
mod parser;

use std::cmp::Ordering;

use thiserror::Error;
use tracing::warn;

use crate::value::{Args, Value};
use lexer::tokenize;
use parser::{CmpOp, Expr, Parser};

/// Why an expression could not produce a boolean.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredicateError {
    #[error("invalid expression at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("type mismatch: {0}")]
    Type(String),

    #[error("expression produced {0}, expected bool")]
    NotBoolean(&'static str),
}

impl PredicateError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// A parsed gating expression, reusable across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Option<Expr>,
}

impl Predicate {
    /// Parse `source`. A blank source is the always-true predicate.
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let trimmed = source.trim();
        let expr = if trimmed.is_empty() {
            None
        } else {
            Some(Parser::new(tokenize(trimmed)?, trimmed.len()).parse()?)
        };
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_unconditional(&self) -> bool {
        self.expr.is_none()
    }

    /// Evaluate against `args`, surfacing the failure reason.
    pub fn try_eval(&self, args: &Args) -> Result<bool, PredicateError> {
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        match eval(expr, args)? {
            Value::Bool(b) => Ok(b),
            other => Err(PredicateError::NotBoolean(other.type_name())),
        }
    }

    /// Fail-closed evaluation: errors are logged and count as `false`.
    pub fn eval(&self, args: &Args) -> bool {
        match self.try_eval(args) {
            Ok(b) => b,
            Err(e) => {
                warn!(expression = %self.source, error = %e, "condition evaluation failed, skipping instrumentation");
                false
            }
        }
    }
}

/// Parse and evaluate `expression` in one go. Never fails: an empty expression
/// is `true`, anything that cannot be evaluated is `false`.
pub fn evaluate(expression: &str, args: &Args) -> bool {
    if expression.trim().is_empty() {
        return true;
    }
    match Predicate::parse(expression) {
        Ok(predicate) => predicate.eval(args),
        Err(e) => {
            warn!(expression = %expression, error = %e, "condition evaluation failed, skipping instrumentation");
            false
        }
    }
}

fn eval(expr: &Expr, args: &Args) -> Result<Value, PredicateError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path { root, fields } => resolve(root, fields, args),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(eval(inner, args)?, "!")?)),
        Expr::And(lhs, rhs) => {
            if !as_bool(eval(lhs, args)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(as_bool(eval(rhs, args)?, "&&")?))
        }
        Expr::Or(lhs, rhs) => {
            if as_bool(eval(lhs, args)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(eval(rhs, args)?, "||")?))
        }
        Expr::Compare(op, lhs, rhs) => {
            let l = eval(lhs, args)?;
            let r = eval(rhs, args)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

/// Unknown variables and missing map keys read as null.
fn resolve(root: &str, fields: &[String], args: &Args) -> Result<Value, PredicateError> {
    let mut current = match root {
        "this" | "root" => args.target_value().cloned().unwrap_or(Value::Null),
        name => args.get(name).cloned().unwrap_or(Value::Null),
    };
    for field in fields {
        current = match &current {
            Value::Map(_) => current.field(field).cloned().unwrap_or(Value::Null),
            other => {
                return Err(PredicateError::Type(format!(
                    "cannot read property '{}' of {}",
                    field,
                    other.type_name()
                )))
            }
        };
    }
    Ok(current)
}

fn as_bool(value: Value, op: &str) -> Result<bool, PredicateError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(PredicateError::Type(format!(
            "operator '{}' needs bool, got {}",
            op,
            other.type_name()
        ))),
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, PredicateError> {
    if matches!(l, Value::Redacted) || matches!(r, Value::Redacted) {
        return Err(PredicateError::Type("redacted values cannot be compared".into()));
    }
    match op {
        CmpOp::Eq => Ok(equals(l, r)),
        CmpOp::Ne => Ok(!equals(l, r)),
        CmpOp::Lt => order(l, r).map(|o| o == Ordering::Less),
        CmpOp::Le => order(l, r).map(|o| o != Ordering::Greater),
        CmpOp::Gt => order(l, r).map(|o| o == Ordering::Greater),
        CmpOp::Ge => order(l, r).map(|o| o != Ordering::Less),
    }
}

fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => l == r,
    }
}

fn order(l: &Value, r: &Value) -> Result<Ordering, PredicateError> {
    let ordering = match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(PredicateError::Type(format!(
                "cannot order {} and {}",
                l.type_name(),
                r.type_name()
            )))
        }
    };
    ordering.ok_or_else(|| PredicateError::Type("NaN is not ordered".into()))
}
