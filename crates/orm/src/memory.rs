//! In-memory adapter over a shared, mutable entity table.
//!
//! Rows are stored as snapshots of their persisted fields, so callers never
//! share state with the table. Several adapters may share one
//! [`MemoryBackend`]; writes made inside a transaction on that backend are
//! journaled and undone on rollback.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapter::{Backend, CrudAdapter, Transaction};
use crate::entity::{Entity, EntitySchema, read_field};
use crate::error::{Error, Result};
use crate::specification::Specification;
use crate::unsupported;
use crate::value::Value;

/// Shared row storage for one entity type.
pub type MemoryTable<T> = Arc<Mutex<Vec<T>>>;

/// Create a table seeded with `rows`.
#[must_use]
pub fn memory_table<T>(rows: Vec<T>) -> MemoryTable<T> {
    Arc::new(Mutex::new(rows))
}

type Undo = Box<dyn FnOnce() + Send>;

/// Transactional backend for in-memory tables.
pub struct MemoryBackend {
    name: String,
    journal: Mutex<Option<Vec<Undo>>>,
}

impl MemoryBackend {
    /// Create a named backend.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), journal: Mutex::new(None) })
    }

    fn record(&self, undo: Undo) {
        if let Some(journal) = self.journal.lock().as_mut() {
            journal.push(undo);
        }
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("name", &self.name)
            .field("journaled", &self.journal.lock().as_ref().map(Vec::len))
            .finish()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> anyhow::Result<()> {
        let mut journal = self.journal.lock();
        if journal.is_some() {
            anyhow::bail!("transaction already open on {}", self.name);
        }
        *journal = Some(Vec::new());
        drop(journal);
        Ok(())
    }

    fn commit(&self) -> anyhow::Result<()> {
        let Some(journal) = self.journal.lock().take() else {
            anyhow::bail!("no transaction open on {}", self.name);
        };
        tracing::debug!(backend = %self.name, writes = journal.len(), "committed journal");
        Ok(())
    }

    fn rollback(&self) -> anyhow::Result<()> {
        let Some(journal) = self.journal.lock().take() else {
            anyhow::bail!("no transaction open on {}", self.name);
        };
        tracing::debug!(backend = %self.name, writes = journal.len(), "undoing journal");
        for undo in journal.into_iter().rev() {
            undo();
        }
        Ok(())
    }
}

/// CRUD adapter over a [`MemoryTable`].
pub struct InMemoryAdapter<T: Entity> {
    table: MemoryTable<T>,
    schema: EntitySchema,
    backend: Option<Arc<MemoryBackend>>,
}

impl<T: Entity> InMemoryAdapter<T> {
    /// Adapter keyed by naming convention.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoKeyProperty`](crate::Error::NoKeyProperty) if no
    /// field matches the convention.
    pub fn new(table: MemoryTable<T>) -> Result<Self> {
        Ok(Self { table, schema: EntitySchema::resolve::<T>()?, backend: None })
    }

    /// Adapter with an explicit key. When `generated` is `None` the identity
    /// flag follows the key's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyProperty`](crate::Error::InvalidKeyProperty)
    /// if `key` is not a scalar field.
    pub fn with_key(table: MemoryTable<T>, key: &str, generated: Option<bool>) -> Result<Self> {
        Ok(Self { table, schema: EntitySchema::with_key::<T>(key, generated)?, backend: None })
    }

    /// Attach the adapter to a transactional backend.
    #[must_use]
    pub fn in_backend(mut self, backend: &Arc<MemoryBackend>) -> Self {
        self.backend = Some(Arc::clone(backend));
        self
    }

    /// The underlying table.
    #[must_use]
    pub const fn table(&self) -> &MemoryTable<T> {
        &self.table
    }

    fn journal(&self, tx: &Transaction, undo: impl FnOnce(&mut Vec<T>) + Send + 'static) {
        let Some(backend) = &self.backend else {
            return;
        };
        let shared: Arc<dyn Backend> = Arc::clone(backend) as Arc<dyn Backend>;
        if !tx.includes(&shared) {
            return;
        }
        let table = Arc::clone(&self.table);
        backend.record(Box::new(move || undo(&mut table.lock())));
    }

    fn position(rows: &[T], key: &str, value: &Value) -> Option<usize> {
        rows.iter().position(|row| row.get(key).as_ref() == Some(value))
    }

    fn next_key(&self, rows: &[T]) -> Result<i64> {
        let mut max = 0;
        for row in rows {
            match read_field(row, self.schema.key())? {
                Value::Int(key) => max = max.max(key),
                Value::Null => {}
                other => {
                    return Err(unsupported!(
                        "{} key {} of {} cannot be generated",
                        other.kind(),
                        self.schema.key(),
                        T::NAME
                    ));
                }
            }
        }
        max.checked_add(1).ok_or_else(|| {
            Error::BackendExecution(anyhow::anyhow!(
                "{} key {} exhausted at {max}",
                T::NAME,
                self.schema.key()
            ))
        })
    }
}

impl<T: Entity> CrudAdapter<T> for InMemoryAdapter<T> {
    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.backend.as_ref().map(|backend| Arc::clone(backend) as Arc<dyn Backend>)
    }

    fn create(&self, tx: &Transaction, entity: &mut T) -> Result<()> {
        let key = self.schema.key();
        let mut rows = self.table.lock();
        if self.schema.is_generated() {
            let next = self.next_key(&rows)?;
            entity.set(key, Value::Int(next))?;
        }
        let row = self.schema.snapshot(entity)?;
        let key_value = read_field(&row, key)?;
        rows.push(row);
        drop(rows);

        tracing::debug!(entity = T::NAME, key = %key_value, "inserted row");
        self.journal(tx, move |rows| {
            let inserted = rows.iter().rposition(|row| row.get(key).as_ref() == Some(&key_value));
            if let Some(pos) = inserted {
                rows.remove(pos);
            }
        });
        Ok(())
    }

    fn update(&self, tx: &Transaction, entity: &T) -> Result<()> {
        let key = self.schema.key();
        let key_value = self.schema.key_value(entity)?;
        let mut rows = self.table.lock();
        let Some(pos) = Self::position(&rows, key, &key_value) else {
            tracing::debug!(entity = T::NAME, key = %key_value, "no row to update");
            return Ok(());
        };

        let before = rows[pos].clone();
        for field in self.schema.persisted_without_key() {
            rows[pos].set(field, read_field(entity, field)?)?;
        }
        drop(rows);

        tracing::debug!(entity = T::NAME, key = %key_value, "updated row");
        self.journal(tx, move |rows| {
            if let Some(row) = rows.get_mut(pos) {
                *row = before;
            }
        });
        Ok(())
    }

    fn delete(&self, tx: &Transaction, entity: &T) -> Result<()> {
        let key = self.schema.key();
        let key_value = self.schema.key_value(entity)?;
        let mut rows = self.table.lock();
        let Some(pos) = Self::position(&rows, key, &key_value) else {
            tracing::debug!(entity = T::NAME, key = %key_value, "no row to delete");
            return Ok(());
        };
        let removed = rows.remove(pos);
        drop(rows);

        tracing::debug!(entity = T::NAME, key = %key_value, "deleted row");
        self.journal(tx, move |rows| rows.insert(pos.min(rows.len()), removed));
        Ok(())
    }

    fn read(&self, spec: &Specification<T>) -> Result<Vec<T>> {
        let rows = self.table.lock();
        let mut found = Vec::new();
        for row in rows.iter() {
            if spec.is_satisfied_by(row)? {
                found.push(row.clone());
            }
        }
        drop(rows);

        tracing::debug!(entity = T::NAME, count = found.len(), "read rows");
        Ok(found)
    }

    fn read_raw(&self, query: &str, _params: &[Value]) -> Result<Vec<T>> {
        tracing::debug!(entity = T::NAME, query, "raw queries are not supported in memory");
        Ok(Vec::new())
    }
}
