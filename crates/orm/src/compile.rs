//! Translation of predicate trees into parameterized SQL fragments.
//!
//! Every node is wrapped in parentheses, so the output never depends on
//! operator precedence. Literal and captured values are always emitted as
//! placeholders numbered by a single counter in depth-first, left-to-right
//! order: compiling the same tree twice yields identical text and
//! parameters.
//!
//! Positions that must hold a truth value (the root, the operand of `NOT`
//! and the operands of `AND` / `OR`) rewrite bare boolean operands into
//! comparisons:
//!
//! | node in truth position | emitted             |
//! |------------------------|---------------------|
//! | boolean field `active` | `([active] = @0)` with `@0 = true` |
//! | boolean constant       | `(@0 = 1)`          |

use std::marker::PhantomData;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::predicate::{BinaryOp, Expr, MatchKind, UnaryOp};
use crate::query::{Dialect, Fragment, Parameter};
use crate::unsupported;
use crate::value::{ScalarType, Value};

/// Predicate compiler for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler {
    dialect: Dialect,
}

impl Compiler {
    /// Compiler for the default dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler for a specific dialect.
    #[must_use]
    pub const fn with_dialect(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Target dialect.
    #[must_use]
    pub const fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Compile a predicate over the fields of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`] for operators without a SQL
    /// counterpart, [`Error::UnknownField`] for fields `T` does not declare
    /// and [`Error::UnsupportedExpression`] for nodes that cannot appear in
    /// their position.
    pub fn compile<T: Entity>(&self, expr: &Expr) -> Result<Fragment> {
        let mut emitter =
            Emitter::<T> { dialect: &self.dialect, params: Vec::new(), _entity: PhantomData };
        let text = emitter.emit(expr, true)?;

        tracing::debug!(
            entity = T::NAME,
            sql = %text,
            param_count = emitter.params.len(),
            "compiled predicate"
        );

        Ok(Fragment { text, params: emitter.params })
    }
}

struct Emitter<'a, T> {
    dialect: &'a Dialect,
    params: Vec<Parameter>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Emitter<'_, T> {
    fn emit(&mut self, expr: &Expr, truth: bool) -> Result<String> {
        match expr {
            Expr::Constant(value) => self.emit_value(value.clone(), truth),
            Expr::Member(record, name) => {
                let value = record.member(name).ok_or_else(|| Error::UnknownField {
                    entity: record.type_name(),
                    field: name.clone(),
                })?;
                self.emit_value(value, truth)
            }
            Expr::Field(name) => self.emit_field(name, truth),
            Expr::Unary(op, operand) => {
                let token = unary_token(*op)?;
                let operand = self.emit(operand, *op == UnaryOp::Not)?;
                Ok(format!("({token} {operand})"))
            }
            Expr::Binary(op, left, right) => {
                let token = binary_token(*op)?;
                let left = self.emit(left, op.is_logical())?;
                let right = self.emit(right, op.is_logical())?;
                Ok(format!("({left} {token} {right})"))
            }
            Expr::StringMatch(kind, target, pattern) => {
                let target = self.emit(target, false)?;
                let pattern = self.emit_pattern(*kind, pattern)?;
                Ok(format!("({target} LIKE {pattern})"))
            }
            Expr::In(target, values) => {
                let target = self.emit(target, false)?;
                let list = if values.is_empty() {
                    "null".to_string()
                } else {
                    values.iter().map(|v| self.push(v.clone())).collect::<Vec<_>>().join(",")
                };
                Ok(format!("({target} IN ({list}))"))
            }
        }
    }

    fn emit_value(&mut self, value: Value, truth: bool) -> Result<String> {
        if !truth {
            return Ok(self.push(value));
        }
        match value {
            Value::Bool(_) => Ok(format!("({} = 1)", self.push(value))),
            other => Err(unsupported!("{} constant is not a truth value", other.kind())),
        }
    }

    fn emit_field(&mut self, name: &str, truth: bool) -> Result<String> {
        let Some(def) = T::fields().iter().find(|def| def.name == name) else {
            if T::navigations().contains(&name) {
                return Err(unsupported!("navigation {name} of {} cannot be queried", T::NAME));
            }
            return Err(Error::UnknownField { entity: T::NAME, field: name.to_string() });
        };

        let column = self.dialect.quote(name);
        if !truth {
            return Ok(column);
        }
        if def.ty.scalar != ScalarType::Bool {
            return Err(unsupported!("{column} is not a truth value"));
        }
        Ok(format!("({column} = {})", self.push(Value::Bool(true))))
    }

    fn emit_pattern(&mut self, kind: MatchKind, pattern: &Expr) -> Result<String> {
        let value = match pattern {
            Expr::Constant(value) => value.clone(),
            Expr::Member(record, name) => record.member(name).ok_or_else(|| {
                Error::UnknownField { entity: record.type_name(), field: name.clone() }
            })?,
            other => {
                return Err(unsupported!("{} cannot be used as a {kind:?} pattern", other.kind()));
            }
        };

        let (prefix, suffix) = kind.wildcards();
        let value = match value {
            Value::Text(text) => Value::Text(format!("{prefix}{text}{suffix}")),
            Value::Null => Value::Null,
            other => return Err(unsupported!("{} cannot be used as a pattern", other.kind())),
        };
        Ok(self.push(value))
    }

    fn push(&mut self, value: Value) -> String {
        let id = self.params.len();
        let name = self.dialect.param(id);
        self.params.push(Parameter { id, name: name.clone(), value });
        name
    }
}

fn unary_token(op: UnaryOp) -> Result<&'static str> {
    match op {
        UnaryOp::Not => Ok("NOT"),
        UnaryOp::Negate => Ok("-"),
        UnaryOp::BitNot => Err(Error::UnsupportedOperator(op.to_string())),
    }
}

fn binary_token(op: BinaryOp) -> Result<&'static str> {
    let token = match op {
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Power | BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::Coalesce => {
            return Err(Error::UnsupportedOperator(op.to_string()));
        }
    };
    Ok(token)
}
