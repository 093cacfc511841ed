//! In-memory evaluation of predicate trees against a single entity.
//!
//! Semantics follow ordinary value comparison rather than SQL three-valued
//! logic: `NULL = NULL` holds, and ordering comparisons involving `NULL` are
//! false. Integers promote to floats when mixed. The same rule applies to
//! membership, so `NULL IN (.., NULL)` is true here while SQL never matches
//! it.

use std::cmp::Ordering;

use crate::entity::{Entity, read_field};
use crate::error::{Error, Result};
use crate::predicate::{BinaryOp, Expr, MatchKind, UnaryOp};
use crate::unsupported;
use crate::value::Value;

/// Decide whether `entity` satisfies `expr`.
///
/// # Errors
///
/// Returns [`Error::UnknownField`] for fields `T` does not declare and
/// [`Error::UnsupportedExpression`] for ill-typed trees, arithmetic
/// overflow and division by zero.
pub fn evaluate<T: Entity>(expr: &Expr, entity: &T) -> Result<bool> {
    truth(&eval(expr, entity)?)
}

fn truth(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(unsupported!("{} value is not a truth value", other.kind())),
    }
}

fn eval<T: Entity>(expr: &Expr, entity: &T) -> Result<Value> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Field(name) => read_field(entity, name),
        Expr::Member(record, name) => record
            .member(name)
            .ok_or_else(|| Error::UnknownField { entity: record.type_name(), field: name.clone() }),
        Expr::Unary(op, operand) => unary(*op, eval(operand, entity)?),
        Expr::Binary(BinaryOp::And, left, right) => {
            Ok(Value::Bool(truth(&eval(left, entity)?)? && truth(&eval(right, entity)?)?))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            Ok(Value::Bool(truth(&eval(left, entity)?)? || truth(&eval(right, entity)?)?))
        }
        Expr::Binary(op, left, right) => binary(*op, eval(left, entity)?, eval(right, entity)?),
        Expr::StringMatch(kind, target, pattern) => {
            let target = eval(target, entity)?;
            let pattern = eval(pattern, entity)?;
            string_match(*kind, &target, &pattern)
        }
        Expr::In(target, values) => {
            let target = eval(target, entity)?;
            Ok(Value::Bool(values.iter().any(|v| target.compare(v) == Some(Ordering::Equal))))
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(i)) => {
            i.checked_neg().map(Value::Int).ok_or_else(|| unsupported!("overflow negating {i}"))
        }
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
        (op, value) => Err(unsupported!("{op} is not defined for {} values", value.kind())),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => equals(&left, &right).map(Value::Bool),
        BinaryOp::Ne => equals(&left, &right).map(|eq| Value::Bool(!eq)),
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = left.compare(&right).ok_or_else(|| mismatch(op, &left, &right))?;
            Ok(Value::Bool(match op {
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }))
        }
        BinaryOp::Coalesce => Ok(if left.is_null() { right } else { left }),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        _ => arithmetic(op, left, right),
    }
}

fn equals(left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        _ => left
            .compare(right)
            .map(|ordering| ordering == Ordering::Equal)
            .ok_or_else(|| mismatch(BinaryOp::Eq, left, right)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => integer(op, a, b),
        (Value::Int(a), Value::Float(b)) => float(op, a as f64, b),
        (Value::Float(a), Value::Int(b)) => float(op, a, b as f64),
        (Value::Float(a), Value::Float(b)) => float(op, a, b),
        (Value::Text(a), Value::Text(b)) if op == BinaryOp::Add => Ok(Value::Text(a + &b)),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::BitAnd => Ok(Value::Bool(a & b)),
            BinaryOp::BitOr => Ok(Value::Bool(a | b)),
            BinaryOp::BitXor => Ok(Value::Bool(a ^ b)),
            _ => Err(mismatch(op, &Value::Bool(a), &Value::Bool(b))),
        },
        (left, right) => Err(mismatch(op, &left, &right)),
    }
}

fn integer(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
        return Err(unsupported!("division by zero in {a} {op} {b}"));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Power => u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)),
        BinaryOp::ShiftLeft => u32::try_from(b).ok().and_then(|n| a.checked_shl(n)),
        BinaryOp::ShiftRight => u32::try_from(b).ok().and_then(|n| a.checked_shr(n)),
        _ => return Err(mismatch(op, &Value::Int(a), &Value::Int(b))),
    };
    result.map(Value::Int).ok_or_else(|| unsupported!("overflow in {a} {op} {b}"))
}

fn float(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
            return Err(unsupported!("division by zero in {a} {op} {b}"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Power => a.powf(b),
        _ => return Err(mismatch(op, &Value::Float(a), &Value::Float(b))),
    };
    Ok(Value::Float(result))
}

fn string_match(kind: MatchKind, target: &Value, pattern: &Value) -> Result<Value> {
    let (Value::Text(target), Value::Text(pattern)) = (target, pattern) else {
        if target.is_null() || pattern.is_null() {
            return Ok(Value::Bool(false));
        }
        return Err(unsupported!(
            "{kind:?} needs text operands, got {} and {}",
            target.kind(),
            pattern.kind()
        ));
    };
    Ok(Value::Bool(match kind {
        MatchKind::Contains => target.contains(pattern.as_str()),
        MatchKind::StartsWith => target.starts_with(pattern.as_str()),
        MatchKind::EndsWith => target.ends_with(pattern.as_str()),
    }))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> Error {
    unsupported!("{op} is not defined for {} and {} values", left.kind(), right.kind())
}
