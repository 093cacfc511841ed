//! # Adapter Traits
//!
//! Storage backends plug into data stores by implementing [`CrudAdapter`].
//! Backends that can group writes into an atomic unit also implement
//! [`Backend`]; a unit of work uses it to commit batches whose stores all
//! share one backend.

use std::fmt::Debug;
use std::sync::Arc;

use crate::entity::{Entity, EntitySchema};
use crate::error::{Error, Result};
use crate::specification::Specification;
use crate::value::Value;

/// Implemented by transactional storage backends.
pub trait Backend: Debug + Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the backend
    /// rejects the request.
    fn begin(&self) -> anyhow::Result<()>;

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the backend fails.
    fn commit(&self) -> anyhow::Result<()>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the backend fails.
    fn rollback(&self) -> anyhow::Result<()>;
}

/// Transaction handle threaded through adapter writes.
///
/// An autocommit handle carries no backend: each write stands on its own.
/// An open handle rolls back when dropped without being committed.
#[derive(Debug)]
pub struct Transaction {
    backend: Option<Arc<dyn Backend>>,
}

impl Transaction {
    /// Open a transaction on `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendExecution`] if the backend cannot begin.
    pub fn begin(backend: Arc<dyn Backend>) -> Result<Self> {
        backend.begin().map_err(Error::BackendExecution)?;
        tracing::debug!(backend = backend.name(), "transaction started");
        Ok(Self { backend: Some(backend) })
    }

    /// Handle for writes outside any transaction.
    #[must_use]
    pub const fn autocommit() -> Self {
        Self { backend: None }
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether writes against `backend` take part in this transaction.
    #[must_use]
    pub fn includes(&self, backend: &Arc<dyn Backend>) -> bool {
        self.backend.as_ref().is_some_and(|open| same_backend(open, backend))
    }

    /// Commit the transaction. A no-op for autocommit handles. When the
    /// backend refuses to commit, the transaction is rolled back on drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendExecution`] if the backend fails to commit.
    pub fn commit(mut self) -> Result<()> {
        self.try_commit()
    }

    // Leaves the handle open on failure so the caller can still roll back.
    pub(crate) fn try_commit(&mut self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        backend.commit().map_err(Error::BackendExecution)?;
        tracing::debug!(backend = backend.name(), "transaction committed");
        self.backend = None;
        Ok(())
    }

    /// Roll the transaction back. A no-op for autocommit handles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendExecution`] if the backend fails to roll back.
    pub fn rollback(mut self) -> Result<()> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        backend.rollback().map_err(Error::BackendExecution)?;
        tracing::debug!(backend = backend.name(), "transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take()
            && let Err(e) = backend.rollback()
        {
            tracing::warn!(backend = backend.name(), error = %e, "rollback on drop failed");
        }
    }
}

/// Whether two handles point at the same backend instance.
#[must_use]
pub fn same_backend(a: &Arc<dyn Backend>, b: &Arc<dyn Backend>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// CRUD capability set a data store delegates to.
///
/// Writes receive the [`Transaction`] they belong to. Adapters whose
/// [`backend`](Self::backend) is included in the transaction must make the
/// write part of it.
pub trait CrudAdapter<T: Entity>: Send + Sync {
    /// Field layout, key and identity flag of `T`.
    fn schema(&self) -> &EntitySchema;

    /// Transactional backend the adapter writes through, if any.
    fn backend(&self) -> Option<Arc<dyn Backend>>;

    /// Persist a new entity. When the key is generated, the assigned value
    /// is written back into `entity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn create(&self, tx: &Transaction, entity: &mut T) -> Result<()>;

    /// Overwrite the persisted non-key fields of the entity with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn update(&self, tx: &Transaction, entity: &T) -> Result<()>;

    /// Remove the entity with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn delete(&self, tx: &Transaction, entity: &T) -> Result<()>;

    /// Entities satisfying the specification, as independent copies.
    ///
    /// # Errors
    ///
    /// Returns an error if the predicate cannot be applied or the backend
    /// fails.
    fn read(&self, spec: &Specification<T>) -> Result<Vec<T>>;

    /// Entities returned by a backend-native query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or rows cannot be materialized.
    fn read_raw(&self, query: &str, params: &[Value]) -> Result<Vec<T>>;
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Refusing {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Backend for Refusing {
        fn name(&self) -> &str {
            "refusing"
        }

        fn begin(&self) -> anyhow::Result<()> {
            self.calls.lock().push("begin");
            Ok(())
        }

        fn commit(&self) -> anyhow::Result<()> {
            self.calls.lock().push("commit");
            anyhow::bail!("deferred constraint failed")
        }

        fn rollback(&self) -> anyhow::Result<()> {
            self.calls.lock().push("rollback");
            Ok(())
        }
    }

    #[test]
    fn refused_commit_rolls_back() {
        let backend = Arc::new(Refusing::default());
        let tx = Transaction::begin(Arc::clone(&backend) as Arc<dyn Backend>).unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, Error::BackendExecution(_)));
        assert_eq!(*backend.calls.lock(), ["begin", "commit", "rollback"]);
    }

    #[test]
    fn failed_try_commit_stays_open() {
        let backend = Arc::new(Refusing::default());
        let mut tx = Transaction::begin(Arc::clone(&backend) as Arc<dyn Backend>).unwrap();

        assert!(tx.try_commit().is_err());
        assert!(tx.is_active());
        tx.rollback().unwrap();
        assert_eq!(*backend.calls.lock(), ["begin", "commit", "rollback"]);
    }

    #[test]
    fn autocommit_is_inert() {
        let tx = Transaction::autocommit();
        assert!(!tx.is_active());
        tx.commit().unwrap();
    }
}
