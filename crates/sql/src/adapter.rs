//! # SQL Adapter
//!
//! [`CrudAdapter`] over a [`Connection`]. Predicates are compiled into
//! parameterized `WHERE` fragments and CRUD statements are generated once,
//! when the adapter is built.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use crudstore_orm::{
    Backend, Compiler, CrudAdapter, Dialect, Entity, EntitySchema, Result, Specification,
    Transaction, Value, read_field,
};

use crate::connection::{Connection, Param, Row, positional};
use crate::statement::Statements;

/// Builder for [`SqlAdapter`].
pub struct SqlAdapterBuilder<T: Entity> {
    conn: Arc<dyn Connection>,
    table: Option<String>,
    key: Option<String>,
    generated: Option<bool>,
    dialect: Option<Dialect>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqlAdapterBuilder<T> {
    /// Table name. Defaults to the entity name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Key field. Defaults to the `id` / `{entity}_id` convention.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether the database generates the key. Defaults to true for
    /// integer keys.
    #[must_use]
    pub const fn generated(mut self, generated: bool) -> Self {
        self.generated = Some(generated);
        self
    }

    /// Statement dialect. Defaults to the connection's.
    #[must_use]
    pub const fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Resolve the schema and generate statements.
    ///
    /// # Errors
    ///
    /// Returns [`NoKeyProperty`](crudstore_orm::Error::NoKeyProperty) when no
    /// key is given and none follows the convention, or
    /// [`InvalidKeyProperty`](crudstore_orm::Error::InvalidKeyProperty) when
    /// the given key is not a field.
    pub fn build(self) -> Result<SqlAdapter<T>> {
        let schema = match (self.key, self.generated) {
            (Some(key), generated) => EntitySchema::with_key::<T>(&key, generated)?,
            (None, None) => EntitySchema::resolve::<T>()?,
            (None, generated) => {
                let key = EntitySchema::resolve::<T>()?.key();
                EntitySchema::with_key::<T>(key, generated)?
            }
        };
        let table = self.table.unwrap_or_else(|| T::NAME.to_string());
        let dialect = self.dialect.unwrap_or_else(|| self.conn.dialect());
        let statements = Statements::new(&table, &schema, &dialect);

        tracing::debug!(
            entity = T::NAME,
            table,
            select = %statements.select,
            insert = %statements.insert,
            update = ?statements.update,
            delete = %statements.delete,
            "generated statements"
        );

        Ok(SqlAdapter {
            conn: self.conn,
            schema,
            table,
            compiler: Compiler::with_dialect(dialect),
            statements,
            _entity: PhantomData,
        })
    }
}

/// CRUD adapter executing generated SQL on a shared [`Connection`].
///
/// The connection doubles as the adapter's transactional backend: every
/// adapter built on the same connection takes part in one transaction.
pub struct SqlAdapter<T: Entity> {
    conn: Arc<dyn Connection>,
    schema: EntitySchema,
    table: String,
    compiler: Compiler,
    statements: Statements,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqlAdapter<T> {
    /// Start building an adapter on `conn`.
    #[must_use]
    pub fn builder(conn: Arc<dyn Connection>) -> SqlAdapterBuilder<T> {
        SqlAdapterBuilder {
            conn,
            table: None,
            key: None,
            generated: None,
            dialect: None,
            _entity: PhantomData,
        }
    }

    /// Adapter with every default: table named after the entity, key by
    /// convention, the connection's dialect.
    ///
    /// # Errors
    ///
    /// Returns [`NoKeyProperty`](crudstore_orm::Error::NoKeyProperty) if no
    /// field follows the key convention.
    pub fn new(conn: Arc<dyn Connection>) -> Result<Self> {
        Self::builder(conn).build()
    }

    /// Table the adapter reads and writes.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Generated statements.
    #[must_use]
    pub const fn statements(&self) -> &Statements {
        &self.statements
    }

    /// Execute a raw command with `@0`, `@1`, ... positional parameters,
    /// returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`BackendExecution`](crudstore_orm::Error::BackendExecution)
    /// if the statement fails.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let params = positional(self.compiler.dialect(), params);
        Ok(self.conn.exec(sql, &params)?)
    }

    fn params(&self, entity: &T, fields: impl Iterator<Item = &'static str>) -> Result<Vec<Param>> {
        let dialect = self.compiler.dialect();
        fields.map(|field| Ok((dialect.param(field), read_field(entity, field)?))).collect()
    }

    fn key_param(&self, entity: &T) -> Result<Vec<Param>> {
        let key = self.schema.key();
        Ok(vec![(self.compiler.dialect().param(key), read_field(entity, key)?)])
    }

    fn materialize(&self, rows: Vec<Row>) -> Result<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                let mut entity = T::default();
                for field in self.schema.persisted() {
                    let value = row.get(field).with_context(|| {
                        format!("column {field} missing from {} row", self.table)
                    })?;
                    entity.set(field, value.clone())?;
                }
                Ok(entity)
            })
            .collect()
    }

    fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<T>> {
        let rows = self
            .conn
            .query(sql, params)
            .with_context(|| format!("failed to read {}", self.table))?;
        let found = self.materialize(rows)?;
        tracing::debug!(entity = T::NAME, count = found.len(), "read rows");
        Ok(found)
    }
}

impl<T: Entity> CrudAdapter<T> for SqlAdapter<T> {
    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        Some(Arc::clone(&self.conn) as Arc<dyn Backend>)
    }

    fn create(&self, _tx: &Transaction, entity: &mut T) -> Result<()> {
        let params = self.params(entity, self.schema.insertable())?;
        let sql = &self.statements.insert;

        if !self.schema.is_generated() {
            self.conn
                .exec(sql, &params)
                .with_context(|| format!("failed to insert into {}", self.table))?;
            return Ok(());
        }

        let identity = self
            .conn
            .insert(sql, &params, self.compiler.dialect())
            .with_context(|| format!("failed to insert into {}", self.table))?;
        tracing::debug!(entity = T::NAME, key = %identity, "assigned generated key");
        entity.set(self.schema.key(), identity)
    }

    fn update(&self, _tx: &Transaction, entity: &T) -> Result<()> {
        let Some(sql) = &self.statements.update else {
            return Ok(());
        };
        let params = self.params(entity, self.schema.persisted())?;
        let affected = self
            .conn
            .exec(sql, &params)
            .with_context(|| format!("failed to update {}", self.table))?;
        if affected == 0 {
            tracing::debug!(entity = T::NAME, "update matched no rows");
        }
        Ok(())
    }

    fn delete(&self, _tx: &Transaction, entity: &T) -> Result<()> {
        let params = self.key_param(entity)?;
        let affected = self
            .conn
            .exec(&self.statements.delete, &params)
            .with_context(|| format!("failed to delete from {}", self.table))?;
        if affected == 0 {
            tracing::debug!(entity = T::NAME, "delete matched no rows");
        }
        Ok(())
    }

    fn read(&self, spec: &Specification<T>) -> Result<Vec<T>> {
        let fragment = spec.to_fragment(&self.compiler)?;
        let sql = self.statements.select_where(&fragment);
        let params: Vec<Param> = fragment.params.into_iter().map(|p| (p.name, p.value)).collect();
        self.query(&sql, &params)
    }

    fn read_raw(&self, query: &str, params: &[Value]) -> Result<Vec<T>> {
        let params = positional(self.compiler.dialect(), params);
        self.query(query, &params)
    }
}

impl<T: Entity> fmt::Debug for SqlAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlAdapter")
            .field("entity", &T::NAME)
            .field("table", &self.table)
            .field("backend", &self.conn.name())
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}
