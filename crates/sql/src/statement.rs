//! CRUD statement text, generated once per adapter.

use crudstore_orm::{Dialect, EntitySchema, Fragment};

/// Statements an adapter executes for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    /// `SELECT [f], ... FROM [t]`, completed by [`Self::select_where`].
    pub select: String,
    /// `INSERT INTO [t] (...) VALUES (...)`. With a generated key on a
    /// batched dialect the identity query is appended.
    pub insert: String,
    /// `UPDATE [t] SET ... WHERE [k] = @k`; `None` when the entity has no
    /// fields besides its key.
    pub update: Option<String>,
    /// `DELETE [t] WHERE [k] = @k`, or `DELETE FROM` where the dialect needs it.
    pub delete: String,
}

impl Statements {
    /// Generate the statements for `table`.
    #[must_use]
    pub fn new(table: &str, schema: &EntitySchema, dialect: &Dialect) -> Self {
        let table = dialect.quote(table);
        let key = schema.key();
        let key_clause = format!("{} = {}", dialect.quote(key), dialect.param(key));

        let select = format!(
            "SELECT {} FROM {table}",
            join(schema.persisted().map(|f| dialect.quote(f)))
        );

        let mut insert = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            join(schema.insertable().map(|f| dialect.quote(f))),
            join(schema.insertable().map(|f| dialect.param(f)))
        );
        if schema.is_generated() && dialect.identity_batched {
            insert = format!("{insert}; {};", dialect.identity);
        }

        let assignments: Vec<String> = schema
            .persisted_without_key()
            .map(|f| format!("{} = {}", dialect.quote(f), dialect.param(f)))
            .collect();
        let update = (!assignments.is_empty())
            .then(|| format!("UPDATE {table} SET {} WHERE {key_clause}", assignments.join(", ")));

        let delete = if dialect.delete_from {
            format!("DELETE FROM {table} WHERE {key_clause}")
        } else {
            format!("DELETE {table} WHERE {key_clause}")
        };

        Self { select, insert, update, delete }
    }

    /// Select statement filtered by a compiled predicate.
    #[must_use]
    pub fn select_where(&self, fragment: &Fragment) -> String {
        format!("{} WHERE {}", self.select, fragment.text)
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
