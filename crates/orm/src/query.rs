//! SQL dialects and compiled query fragments.

use crate::value::{DATETIME_FORMAT, Value};

/// Identifier quoting, placeholder and statement-shape conventions of a
/// target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Opening and closing identifier quotes.
    pub quote: (char, char),
    /// Prefix of named placeholders (`@` for `@0`, `@name`).
    pub placeholder: char,
    /// Query returning the identity generated by the last insert.
    pub identity: &'static str,
    /// Whether the identity query is appended to the insert statement
    /// instead of being run separately.
    pub identity_batched: bool,
    /// Whether deletes are written `DELETE FROM [t]` rather than `DELETE [t]`.
    pub delete_from: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::sql_server()
    }
}

impl Dialect {
    /// Bracket-quoted, `@`-parameterized dialect with batched identity
    /// retrieval and the short `DELETE [t]` form.
    #[must_use]
    pub const fn sql_server() -> Self {
        Self {
            quote: ('[', ']'),
            placeholder: '@',
            identity: "SELECT CAST(SCOPE_IDENTITY() AS INT)",
            identity_batched: true,
            delete_from: false,
        }
    }

    /// Same quoting and placeholders, accepted by `SQLite`. Identity is read
    /// with a second statement and deletes use `DELETE FROM`.
    #[must_use]
    pub const fn sqlite() -> Self {
        Self {
            quote: ('[', ']'),
            placeholder: '@',
            identity: "SELECT last_insert_rowid()",
            identity_batched: false,
            delete_from: true,
        }
    }

    /// Quote an identifier.
    #[must_use]
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = self.quote;
        format!("{open}{ident}{close}")
    }

    /// Placeholder for a named parameter.
    #[must_use]
    pub fn param(&self, name: impl std::fmt::Display) -> String {
        format!("{}{name}", self.placeholder)
    }
}

/// Bound parameter of a compiled fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Position in emission order.
    pub id: usize,
    /// Placeholder as written in the fragment text (`@0`).
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// Parameterized SQL fragment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    /// Fragment text with placeholders.
    pub text: String,
    /// Parameters in emission order.
    pub params: Vec<Parameter>,
}

impl Fragment {
    /// Fragment text with every placeholder replaced by an inline literal.
    /// For diagnostics only; never execute the result.
    #[must_use]
    pub fn to_raw_sql(&self) -> String {
        let mut raw = self.text.clone();
        // longest names first so `@1` never clobbers `@12`
        let mut params: Vec<&Parameter> = self.params.iter().collect();
        params.sort_by(|a, b| b.name.len().cmp(&a.name.len()).then(b.id.cmp(&a.id)));
        for param in params {
            raw = raw.replace(&param.name, &literal(&param.value));
        }
        raw
    }
}

/// Render a value as an inline SQL literal.
#[must_use]
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
    }
}
