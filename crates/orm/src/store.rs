//! Per-entity buffer of pending changes in front of an adapter.

use std::fmt;

use crate::adapter::CrudAdapter;
use crate::entity::{Entity, EntitySchema};
use crate::error::{Error, Result};
use crate::specification::Specification;
use crate::value::Value;

/// Kind of a buffered mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create on commit.
    Insert,
    /// Overwrite on commit.
    Update,
    /// Remove on commit.
    Delete,
}

/// A buffered mutation and the entity state it was recorded with.
#[derive(Debug, Clone)]
pub struct PendingOperation<T> {
    /// What to do.
    pub kind: Operation,
    /// Entity as it was when the mutation was recorded.
    pub entity: T,
}

/// Typed facade over one adapter that buffers mutations until a unit of
/// work commits them. Reads go straight to the adapter.
pub struct DataStore<T: Entity> {
    adapter: Box<dyn CrudAdapter<T>>,
    pending: Vec<PendingOperation<T>>,
}

impl<T: Entity> DataStore<T> {
    /// Store over `adapter`.
    #[must_use]
    pub fn new(adapter: impl CrudAdapter<T> + 'static) -> Self {
        Self { adapter: Box::new(adapter), pending: Vec::new() }
    }

    /// Buffer an insert.
    pub fn add(&mut self, entity: T) {
        self.buffer(Operation::Insert, entity);
    }

    /// Buffer an update.
    pub fn update(&mut self, entity: T) {
        self.buffer(Operation::Update, entity);
    }

    /// Buffer a delete.
    pub fn delete(&mut self, entity: T) {
        self.buffer(Operation::Delete, entity);
    }

    fn buffer(&mut self, kind: Operation, entity: T) {
        let pending = self.pending.len() + 1;
        tracing::debug!(entity = T::NAME, operation = ?kind, pending, "buffered");
        self.pending.push(PendingOperation { kind, entity });
    }

    /// Entities satisfying `spec`. Buffered mutations are not visible.
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub fn find(&self, spec: &Specification<T>) -> Result<Vec<T>> {
        self.adapter.read(spec)
    }

    /// The single entity satisfying `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches and
    /// [`Error::AmbiguousResult`] when more than one entity does.
    pub fn find_single(&self, spec: &Specification<T>) -> Result<T> {
        let mut found = self.find(spec)?;
        match found.len() {
            0 => Err(Error::NotFound { entity: T::NAME }),
            1 => Ok(found.remove(0)),
            count => Err(Error::AmbiguousResult { entity: T::NAME, count }),
        }
    }

    /// Entities returned by a backend-native query.
    ///
    /// # Errors
    ///
    /// Propagates adapter errors.
    pub fn find_raw(&self, query: &str, params: &[Value]) -> Result<Vec<T>> {
        self.adapter.read_raw(query, params)
    }

    /// Buffered mutations in recording order.
    #[must_use]
    pub fn pending(&self) -> &[PendingOperation<T>] {
        &self.pending
    }

    /// Drop every buffered mutation.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return every buffered mutation.
    pub(crate) fn take_pending(&mut self) -> Vec<PendingOperation<T>> {
        std::mem::take(&mut self.pending)
    }

    /// Resolved schema of `T`.
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        self.adapter.schema()
    }

    /// The adapter writes and reads are delegated to.
    #[must_use]
    pub fn adapter(&self) -> &dyn CrudAdapter<T> {
        self.adapter.as_ref()
    }
}

impl<T: Entity> fmt::Debug for DataStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("entity", &T::NAME)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{InMemoryAdapter, memory_table};
    use crate::predicate::Expr;

    crate::entity! {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Person {
            pub person_id: i32,
            pub firstname: String,
            pub lastname: String,
        }
    }

    fn person(id: i32, first: &str) -> Person {
        Person { person_id: id, firstname: first.to_string(), lastname: "Einstein".to_string() }
    }

    fn store() -> DataStore<Person> {
        let table = memory_table(vec![person(1, "Hermann"), person(2, "Albert"), person(3, "Maja")]);
        DataStore::new(InMemoryAdapter::new(table).unwrap())
    }

    #[test]
    fn mutations_are_buffered() {
        let table = memory_table(Vec::new());
        let mut store = DataStore::new(InMemoryAdapter::new(Arc::clone(&table)).unwrap());

        store.add(person(0, "Eduard"));
        store.delete(person(1, "Hermann"));
        assert!(table.lock().is_empty());

        let kinds: Vec<_> = store.pending().iter().map(|op| op.kind).collect();
        assert_eq!(kinds, [Operation::Insert, Operation::Delete]);

        store.clear();
        assert!(store.pending().is_empty());
    }

    #[test]
    fn find_single_cardinality() {
        let store = store();

        let albert = store.find_single(&Expr::field("firstname").eq("Albert").into()).unwrap();
        assert_eq!(albert.person_id, 2);

        let err = store.find_single(&Expr::field("firstname").eq("Eduard").into()).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "Person" }));

        let err = store.find_single(&Specification::all()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousResult { entity: "Person", count: 3 }));
    }

    #[test]
    fn find_all() {
        let store = store();
        assert_eq!(store.find(&Specification::all()).unwrap().len(), 3);
        assert_eq!(store.schema().key(), "person_id");
    }
}
