//! Predicate trees over the fields of one entity type.
//!
//! Trees are built directly with [`Expr`] constructors and operators rather
//! than captured from closures:
//!
//! ```ignore
//! let adults = Expr::field("age").ge(18).and(Expr::field("lastname").starts_with("Ein"));
//! let in_set = Expr::field("person_id").is_in([1, 2, 3]);
//! let derived = (Expr::field("score") + 10).gt(100);
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::entity::{Captured, Record};
use crate::value::Value;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Negate,
    /// Bitwise complement.
    BitNot,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Addition (or text concatenation).
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Bitwise and.
    BitAnd,
    /// Bitwise or.
    BitOr,
    /// Bitwise exclusive or.
    BitXor,
    /// Exponentiation.
    Power,
    /// Left shift.
    ShiftLeft,
    /// Right shift.
    ShiftRight,
    /// First non-null operand.
    Coalesce,
}

impl BinaryOp {
    /// Operators whose operands are truth values.
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// String pattern operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Pattern occurs anywhere.
    Contains,
    /// Pattern is a prefix.
    StartsWith,
    /// Pattern is a suffix.
    EndsWith,
}

impl MatchKind {
    /// Wildcards placed before and after the pattern value.
    #[must_use]
    pub const fn wildcards(self) -> (&'static str, &'static str) {
        match self {
            Self::Contains => ("%", "%"),
            Self::StartsWith => ("", "%"),
            Self::EndsWith => ("%", ""),
        }
    }
}

/// Predicate tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value; always compiled to a parameter.
    Constant(Value),
    /// Field of the entity under test.
    Field(String),
    /// Member of a captured record, read when the tree is compiled or
    /// evaluated.
    Member(Captured, String),
    /// Unary operation.
    Unary(UnaryOp, Box<Self>),
    /// Binary operation.
    Binary(BinaryOp, Box<Self>, Box<Self>),
    /// Pattern match of `target` against `pattern`.
    StringMatch(MatchKind, Box<Self>, Box<Self>),
    /// Membership of `target` in a set of values.
    In(Box<Self>, Vec<Value>),
}

impl Expr {
    /// Field of the entity under test.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Literal value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Literal value; alias of [`Expr::value`].
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::value(value)
    }

    /// Member of a captured record. The record is snapshotted.
    #[must_use]
    pub fn member<R: Record + Clone + 'static>(record: &R, name: impl Into<String>) -> Self {
        Self::Member(Arc::new(record.clone()), name.into())
    }

    /// Predicate satisfied by every entity.
    #[must_use]
    pub const fn always() -> Self {
        Self::Constant(Value::Bool(true))
    }

    /// Binary node.
    #[must_use]
    pub fn binary(op: BinaryOp, left: impl Into<Self>, right: impl Into<Self>) -> Self {
        Self::Binary(op, Box::new(left.into()), Box::new(right.into()))
    }

    /// Unary node.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: impl Into<Self>) -> Self {
        Self::Unary(op, Box::new(operand.into()))
    }

    /// `self = rhs`
    #[must_use]
    pub fn eq(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    /// `self <> rhs`
    #[must_use]
    pub fn ne(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs)
    }

    /// `self > rhs`
    #[must_use]
    pub fn gt(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs)
    }

    /// `self >= rhs`
    #[must_use]
    pub fn ge(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    /// `self < rhs`
    #[must_use]
    pub fn lt(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs)
    }

    /// `self <= rhs`
    #[must_use]
    pub fn le(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Le, self, rhs)
    }

    /// Logical `self AND rhs`.
    #[must_use]
    pub fn and(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::And, self, rhs)
    }

    /// Logical `self OR rhs`.
    #[must_use]
    pub fn or(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Or, self, rhs)
    }

    /// `COALESCE(self, rhs)`
    #[must_use]
    pub fn coalesce(self, rhs: impl Into<Self>) -> Self {
        Self::binary(BinaryOp::Coalesce, self, rhs)
    }

    /// Text contains `pattern`.
    #[must_use]
    pub fn contains(self, pattern: impl Into<Self>) -> Self {
        Self::StringMatch(MatchKind::Contains, Box::new(self), Box::new(pattern.into()))
    }

    /// Text starts with `pattern`.
    #[must_use]
    pub fn starts_with(self, pattern: impl Into<Self>) -> Self {
        Self::StringMatch(MatchKind::StartsWith, Box::new(self), Box::new(pattern.into()))
    }

    /// Text ends with `pattern`.
    #[must_use]
    pub fn ends_with(self, pattern: impl Into<Self>) -> Self {
        Self::StringMatch(MatchKind::EndsWith, Box::new(self), Box::new(pattern.into()))
    }

    /// Membership in a set of values.
    #[must_use]
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(Box::new(self), values.into_iter().map(Into::into).collect())
    }

    /// Node kind, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Constant(_) => "Constant",
            Self::Field(_) => "FieldAccess",
            Self::Member(..) => "MemberAccess",
            Self::Unary(..) => "UnaryOp",
            Self::Binary(..) => "BinaryOp",
            Self::StringMatch(..) => "StringMatch",
            Self::In(..) => "SetMembership",
        }
    }
}

macro_rules! expr_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Self::Constant(value.into())
                }
            }
        )*
    };
}

expr_from!(Value, bool, i32, i64, u32, f64, &str, String, NaiveDateTime);

impl std::ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        Self::unary(UnaryOp::Negate, self)
    }
}

macro_rules! binary_ops {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
                type Output = Self;

                fn $method(self, rhs: R) -> Self {
                    Self::binary(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

binary_ops! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
    BitAnd::bitand => BitAnd,
    BitOr::bitor => BitOr,
    BitXor::bitxor => BitXor,
}
