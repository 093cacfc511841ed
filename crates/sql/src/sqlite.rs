//! `SQLite` connection.
//!
//! Intended for development and tests; statements use the
//! [`Dialect::sqlite`] profile.

#![allow(clippy::significant_drop_tightening)]

use std::fmt;

use anyhow::{Context, Result, bail};
use crudstore_orm::{Backend, DATETIME_FORMAT, Dialect, Value};
use fromenv::FromEnv;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use tracing::instrument;

use crate::connection::{Connect, Connection, Field, Param, Row};

/// Options used to open the `SQLite` database.
///
/// Loaded from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path, or `:memory:` for a private in-memory database.
    #[env(from = "CRUDSTORE_DATABASE", default = ":memory:")]
    pub database: String,
}

impl crate::connection::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// `SQLite` connection shared by every adapter built on it.
pub struct SqliteConnection {
    database: String,
    // rusqlite::Connection isn't `Sync`
    conn: Mutex<rusqlite::Connection>,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection").field("database", &self.database).finish_non_exhaustive()
    }
}

impl Connect for SqliteConnection {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    fn connect_with(options: ConnectOptions) -> Result<Self> {
        tracing::debug!("opening SQLite database: {}", options.database);
        let conn = rusqlite::Connection::open(&options.database)
            .context("failed to open SQLite database")?;
        Ok(Self { database: options.database, conn: Mutex::new(conn) })
    }
}

impl SqliteConnection {
    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn in_memory() -> Result<Self> {
        Self::connect_with(ConnectOptions { database: ":memory:".to_string() })
    }
}

impl Backend for SqliteConnection {
    fn name(&self) -> &str {
        &self.database
    }

    fn begin(&self) -> Result<()> {
        self.conn.lock().execute_batch("BEGIN").context("failed to begin transaction")
    }

    fn commit(&self) -> Result<()> {
        self.conn.lock().execute_batch("COMMIT").context("failed to commit transaction")
    }

    fn rollback(&self) -> Result<()> {
        self.conn.lock().execute_batch("ROLLBACK").context("failed to roll back transaction")
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::sqlite()
    }

    fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>> {
        tracing::debug!("executing query: {sql}");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        bind(&mut stmt, params)?;

        let column_names: Vec<String> =
            stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next().context("failed to fetch row")? {
            let mut fields = Vec::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                let value = row.get_ref(i).context("failed to get column value")?;
                fields.push(Field { name: name.clone(), value: from_sqlite(name, value)? });
            }
            result.push(Row { index: result.len(), fields });
        }

        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Param]) -> Result<usize> {
        tracing::debug!("executing statement: {sql}");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
        bind(&mut stmt, params)?;
        stmt.raw_execute().context("failed to execute statement")
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing batch: {sql}");
        self.conn.lock().execute_batch(sql).context("failed to execute batch")
    }
}

fn bind(stmt: &mut rusqlite::Statement<'_>, params: &[Param]) -> Result<()> {
    for (name, value) in params {
        let Some(index) = stmt.parameter_index(name).context("invalid parameter name")? else {
            continue;
        };
        stmt.raw_bind_parameter(index, to_sqlite(value))
            .with_context(|| format!("failed to bind {name}"))?;
    }
    Ok(())
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::DateTime(dt) => SqliteValue::Text(dt.format(DATETIME_FORMAT).to_string()),
    }
}

fn from_sqlite(column: &str, value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Int(i)),
        ValueRef::Real(f) => Ok(Value::Float(f)),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Value::Text(s.to_string()))
        }
        ValueRef::Blob(_) => bail!("column {column} holds a blob, which has no value mapping"),
    }
}
