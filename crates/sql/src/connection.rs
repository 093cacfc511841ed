//! # Connections
//!
//! Synchronous SQL connections used by [`SqlAdapter`](crate::SqlAdapter).
//! A connection is also the transactional [`Backend`] for every adapter
//! built on it, so stores sharing one connection commit atomically.

use anyhow::Result;
use crudstore_orm::{Backend, Dialect, Value};

/// Named parameter: placeholder as written in the statement (`@name`) and
/// the value bound to it.
pub type Param = (String, Value);

/// Column value of a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name as reported by the database.
    pub name: String,
    /// Column value.
    pub value: Value,
}

/// Result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Position of the row in the result set.
    pub index: usize,
    /// Columns in select order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Value of the named column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)).map(|f| &f.value)
    }
}

/// SQL connection an adapter executes statements on.
///
/// Parameters are bound by name. Names present in `params` but absent from
/// the statement are ignored.
pub trait Connection: Backend + 'static {
    /// Dialect statements for this connection are written in.
    fn dialect(&self) -> Dialect;

    /// Run a query and collect its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or executed.
    fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>>;

    /// Execute a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or executed.
    fn exec(&self, sql: &str, params: &[Param]) -> Result<usize>;

    /// Execute one or more unparameterized statements, such as DDL.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Execute an insert and return the identity it generated.
    ///
    /// With a batched `dialect` the identity query is already part of `sql`
    /// and its single value is returned; otherwise the dialect's identity
    /// query runs as a second statement.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails or no identity is returned.
    fn insert(&self, sql: &str, params: &[Param], dialect: &Dialect) -> Result<Value> {
        let rows = if dialect.identity_batched {
            self.query(sql, params)?
        } else {
            self.exec(sql, params)?;
            self.query(dialect.identity, &[])?
        };
        rows.into_iter()
            .next()
            .and_then(|row| row.fields.into_iter().next())
            .map(|field| field.value)
            .ok_or_else(|| anyhow::anyhow!("insert returned no identity"))
    }
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}

/// Implemented by connections that can be opened from options.
pub trait Connect: Sized {
    /// The options used to open the connection.
    type ConnectOptions: FromEnv;

    /// Open a connection with options loaded from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be loaded or the connection
    /// cannot be opened.
    fn connect() -> Result<Self> {
        Self::connect_with(Self::ConnectOptions::from_env()?)
    }

    /// Open a connection with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    fn connect_with(options: Self::ConnectOptions) -> Result<Self>;
}

/// Bind positional values to `@0`, `@1`, ... placeholders.
#[must_use]
pub fn positional(dialect: &Dialect, values: &[Value]) -> Vec<Param> {
    values.iter().enumerate().map(|(i, value)| (dialect.param(i), value.clone())).collect()
}
