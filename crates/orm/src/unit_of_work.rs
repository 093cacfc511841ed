//! # Unit of Work
//!
//! Coordinates buffered mutations and relationship hydration across the data
//! stores registered with it.
//!
//! A commit drains every buffer and applies it in three global phases:
//! inserts, then updates, then deletes, each in store registration order.
//! Relationship mappings cascade each write into the parent's navigation
//! children:
//!
//! - insert: children are created after their foreign key is set to the
//!   parent's joined field;
//! - update: children without an assigned key are created, the others
//!   updated;
//! - delete: children are deleted before the parent.
//!
//! When every participating store writes through the same transactional
//! backend the batch runs inside one transaction and a failure restores the
//! pre-commit state. Otherwise writes run one by one and a failure leaves
//! earlier writes applied; [`Error::Commit`] reports where it stopped.
//!
//! ```ignore
//! let mut uow = UnitOfWork::new();
//! uow.register(people)
//!     .map(|p: &mut Person| &mut p.identifications, Join::on("person_id", "person_id"))?;
//! uow.register(identifications);
//!
//! uow.add(person)?;
//! let committed = uow.commit()?;
//! let person = &committed.inserted::<Person>()[0];
//! ```

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::instrument;

use crate::adapter::{Backend, Transaction, same_backend};
use crate::entity::{Entity, read_field};
use crate::error::{Error, Phase, Result};
use crate::predicate::Expr;
use crate::specification::Specification;
use crate::store::{DataStore, Operation, PendingOperation};
use crate::value::Value;

/// Accessor for a navigation collection of `P` holding `C` entities.
pub type Navigation<P, C> = fn(&mut P) -> &mut Vec<C>;

/// Join rule of a relationship: a child belongs to a parent when the child's
/// field equals the parent's field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    parent_field: &'static str,
    child_field: &'static str,
}

impl Join {
    /// Join `parent.parent_field = child.child_field`.
    #[must_use]
    pub const fn on(parent_field: &'static str, child_field: &'static str) -> Self {
        Self { parent_field, child_field }
    }

    /// Parent side of the join, usually the parent key.
    #[must_use]
    pub const fn parent_field(&self) -> &'static str {
        self.parent_field
    }

    /// Child side of the join, the foreign key.
    #[must_use]
    pub const fn child_field(&self) -> &'static str {
        self.child_field
    }

    /// Predicate selecting the children of a parent whose joined field holds
    /// `parent_value`.
    #[must_use]
    pub fn predicate(&self, parent_value: Value) -> Expr {
        Expr::field(self.child_field).eq(parent_value)
    }
}

/// Outcome of a successful commit.
pub struct Committed {
    applied: usize,
    inserted: Vec<(TypeId, Box<dyn Any>)>,
}

impl Committed {
    /// Adapter writes performed, cascaded ones included.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied
    }

    /// Buffered inserts of `T` as committed, generated keys assigned.
    #[must_use]
    pub fn inserted<T: Entity>(&self) -> &[T] {
        self.inserted
            .iter()
            .find(|(id, _)| *id == TypeId::of::<T>())
            .and_then(|(_, entities)| entities.downcast_ref::<Vec<T>>())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Committed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Committed").field("applied", &self.applied).finish_non_exhaustive()
    }
}

/// Session-scoped coordinator of data stores. Single owner; not shared
/// between threads.
#[derive(Default)]
pub struct UnitOfWork {
    stores: Vec<Box<dyn AnyStore>>,
    index: HashMap<TypeId, usize>,
    relations: Vec<Box<dyn AnyRelation>>,
    last: Option<TypeId>,
}

impl UnitOfWork {
    /// Empty unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the store for `T`, replacing any store registered for `T`
    /// before. The returned handle maps relationships rooted at `T`.
    pub fn register<T: Entity>(&mut self, store: DataStore<T>) -> Registration<'_, T> {
        let id = TypeId::of::<T>();
        if let Some(&slot) = self.index.get(&id) {
            tracing::warn!(entity = T::NAME, "replacing registered data store");
            self.stores[slot] = Box::new(store);
        } else {
            self.index.insert(id, self.stores.len());
            self.stores.push(Box::new(store));
        }
        self.last = Some(id);
        Registration { uow: self, _entity: PhantomData }
    }

    /// Map a relationship rooted at the most recently registered type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] if `P` was not the last type
    /// registered, or [`Error::UnknownField`] if a join field is not declared.
    pub fn map<P: Entity, C: Entity>(
        &mut self, navigation: Navigation<P, C>, join: Join,
    ) -> Result<()> {
        if self.last != Some(TypeId::of::<P>()) {
            return Err(Error::UnregisteredEntity(P::NAME));
        }
        self.relate(navigation, join)
    }

    fn relate<P: Entity, C: Entity>(
        &mut self, navigation: Navigation<P, C>, join: Join,
    ) -> Result<()> {
        if !P::fields().iter().any(|def| def.name == join.parent_field) {
            let field = join.parent_field.to_string();
            return Err(Error::UnknownField { entity: P::NAME, field });
        }
        if !C::fields().iter().any(|def| def.name == join.child_field) {
            let field = join.child_field.to_string();
            return Err(Error::UnknownField { entity: C::NAME, field });
        }
        tracing::debug!(
            parent = P::NAME,
            child = C::NAME,
            parent_field = join.parent_field,
            child_field = join.child_field,
            "mapped relationship"
        );
        self.relations.push(Box::new(Relation { navigation, join }));
        Ok(())
    }

    /// Registered store for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] if no store is registered.
    pub fn store<T: Entity>(&self) -> Result<&DataStore<T>> {
        lookup(&self.stores, &self.index)
    }

    fn store_mut<T: Entity>(&mut self) -> Result<&mut DataStore<T>> {
        self.index
            .get(&TypeId::of::<T>())
            .and_then(|&slot| self.stores[slot].as_any_mut().downcast_mut())
            .ok_or(Error::UnregisteredEntity(T::NAME))
    }

    /// Buffer an insert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] if no store is registered for `T`.
    pub fn add<T: Entity>(&mut self, entity: T) -> Result<()> {
        self.store_mut::<T>()?.add(entity);
        Ok(())
    }

    /// Buffer an update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] if no store is registered for `T`.
    pub fn update<T: Entity>(&mut self, entity: T) -> Result<()> {
        self.store_mut::<T>()?.update(entity);
        Ok(())
    }

    /// Buffer a delete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] if no store is registered for `T`.
    pub fn delete<T: Entity>(&mut self, entity: T) -> Result<()> {
        self.store_mut::<T>()?.delete(entity);
        Ok(())
    }

    /// Entities satisfying `spec`, navigation collections hydrated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredEntity`] for unregistered parent or
    /// child types and propagates adapter errors.
    pub fn find<T: Entity>(&self, spec: &Specification<T>) -> Result<Vec<T>> {
        let mut found = self.store::<T>()?.find(spec)?;
        self.hydrate(&mut found)?;
        Ok(found)
    }

    /// The single entity satisfying `spec`, navigation collections hydrated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] or [`Error::AmbiguousResult`] when the
    /// match count is not one, plus the errors of [`find`](Self::find).
    pub fn find_single<T: Entity>(&self, spec: &Specification<T>) -> Result<T> {
        let mut found = self.store::<T>()?.find_single(spec)?;
        self.hydrate(std::slice::from_mut(&mut found))?;
        Ok(found)
    }

    /// Entities returned by a backend-native query, navigation collections
    /// hydrated.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub fn find_raw<T: Entity>(&self, query: &str, params: &[Value]) -> Result<Vec<T>> {
        let mut found = self.store::<T>()?.find_raw(query, params)?;
        self.hydrate(&mut found)?;
        Ok(found)
    }

    fn hydrate<T: Entity>(&self, parents: &mut [T]) -> Result<()> {
        for relation in self.relations.iter().filter(|r| r.parent() == TypeId::of::<T>()) {
            for parent in parents.iter_mut() {
                relation.hydrate(parent, self)?;
            }
        }
        Ok(())
    }

    /// Buffered mutations across all stores.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.stores.iter().map(|store| store.pending()).sum()
    }

    /// Discard every buffered mutation.
    pub fn rollback(&mut self) {
        let discarded = self.pending();
        for store in &mut self.stores {
            store.clear();
        }
        tracing::debug!(discarded, "discarded buffered mutations");
    }

    /// Apply every buffered mutation. Buffers are empty afterwards whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Commit`] describing the failed operation and whether
    /// the batch was rolled back (a refused final commit is reported in
    /// [`Phase::Commit`] against the first store with buffered work), or
    /// [`Error::BackendExecution`] if the shared transaction cannot be
    /// opened.
    #[instrument(skip(self), fields(stores = self.stores.len()))]
    pub fn commit(&mut self) -> Result<Committed> {
        let mut batches: Vec<(usize, Box<dyn Batch>)> = self
            .stores
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, store)| store.take_batch().map(|batch| (slot, batch)))
            .collect();
        if batches.is_empty() {
            return Ok(Committed { applied: 0, inserted: Vec::new() });
        }

        let participants = self.participants(batches.iter().map(|(slot, _)| *slot));
        let mut tx = match self.shared_backend(&participants) {
            Some(backend) => Transaction::begin(backend)?,
            None => Transaction::autocommit(),
        };
        tracing::debug!(
            batches = batches.len(),
            participants = participants.len(),
            transactional = tx.is_active(),
            "committing"
        );

        let ctx = CommitContext {
            stores: &self.stores,
            index: &self.index,
            relations: &self.relations,
            tx: &tx,
            applied: Cell::new(0),
        };
        let phases = [Phase::Insert, Phase::Update, Phase::Delete];
        let outcome = phases.into_iter().try_for_each(|phase| {
            tracing::debug!(%phase, "commit phase");
            batches.iter_mut().try_for_each(|(_, batch)| batch.apply(phase, &ctx))
        });
        let applied = ctx.applied.get();
        let outcome = outcome.and_then(|()| {
            tx.try_commit().map_err(|source| Failure {
                entity: self.stores[batches[0].0].entity(),
                phase: Phase::Commit,
                source,
            })
        });

        match outcome {
            Ok(()) => {
                tracing::debug!(applied, "commit complete");
                let inserted =
                    batches.into_iter().map(|(_, batch)| batch.into_inserted()).collect();
                Ok(Committed { applied, inserted })
            }
            Err(Failure { entity, phase, source }) => {
                let rolled_back = if tx.is_active() {
                    match tx.rollback() {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, "rollback after failed commit failed");
                            false
                        }
                    }
                } else {
                    false
                };
                if rolled_back {
                    tracing::warn!(entity, %phase, applied, error = %source, "commit rolled back");
                } else {
                    tracing::warn!(
                        entity, %phase, applied, error = %source,
                        "commit failed, earlier changes remain applied"
                    );
                }
                Err(Error::Commit { applied, rolled_back, entity, phase, source: Box::new(source) })
            }
        }
    }

    // Stores holding buffered work plus every store reachable from them
    // through relationship mappings.
    fn participants(&self, slots: impl Iterator<Item = usize>) -> Vec<usize> {
        let mut participants: Vec<usize> = slots.collect();
        let mut cursor = 0;
        while let Some(&slot) = participants.get(cursor) {
            let parent = self.stores[slot].entity_type();
            for relation in self.relations.iter().filter(|r| r.parent() == parent) {
                if let Some(&child) = self.index.get(&relation.child())
                    && !participants.contains(&child)
                {
                    participants.push(child);
                }
            }
            cursor += 1;
        }
        participants
    }

    fn shared_backend(&self, participants: &[usize]) -> Option<Arc<dyn Backend>> {
        let mut shared: Option<Arc<dyn Backend>> = None;
        for &slot in participants {
            let backend = self.stores[slot].backend()?;
            match &shared {
                Some(current) if !same_backend(current, &backend) => return None,
                Some(_) => {}
                None => shared = Some(backend),
            }
        }
        shared
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores: Vec<_> = self.stores.iter().map(|store| store.entity()).collect();
        f.debug_struct("UnitOfWork")
            .field("stores", &stores)
            .field("relations", &self.relations.len())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Handle returned by [`UnitOfWork::register`] for mapping relationships
/// rooted at `P`.
pub struct Registration<'a, P> {
    uow: &'a mut UnitOfWork,
    _entity: PhantomData<fn() -> P>,
}

impl<P: Entity> Registration<'_, P> {
    /// Map the navigation collection of `P` holding `C` children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if a join field is not declared.
    pub fn map<C: Entity>(self, navigation: Navigation<P, C>, join: Join) -> Result<Self> {
        self.uow.relate(navigation, join)?;
        Ok(self)
    }
}

fn lookup<'a, T: Entity>(
    stores: &'a [Box<dyn AnyStore>], index: &HashMap<TypeId, usize>,
) -> Result<&'a DataStore<T>> {
    index
        .get(&TypeId::of::<T>())
        .and_then(|&slot| stores[slot].as_any().downcast_ref())
        .ok_or(Error::UnregisteredEntity(T::NAME))
}

// --- type erasure ---

trait AnyStore {
    fn entity(&self) -> &'static str;
    fn entity_type(&self) -> TypeId;
    fn backend(&self) -> Option<Arc<dyn Backend>>;
    fn pending(&self) -> usize;
    fn clear(&mut self);
    fn take_batch(&mut self) -> Option<Box<dyn Batch>>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> AnyStore for DataStore<T> {
    fn entity(&self) -> &'static str {
        T::NAME
    }

    fn entity_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.adapter().backend()
    }

    fn pending(&self) -> usize {
        DataStore::<T>::pending(self).len()
    }

    fn clear(&mut self) {
        DataStore::<T>::clear(self);
    }

    fn take_batch(&mut self) -> Option<Box<dyn Batch>> {
        let ops = self.take_pending();
        if ops.is_empty() {
            return None;
        }
        Some(Box::new(ops))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Failure {
    entity: &'static str,
    phase: Phase,
    source: Error,
}

struct CommitContext<'a> {
    stores: &'a [Box<dyn AnyStore>],
    index: &'a HashMap<TypeId, usize>,
    relations: &'a [Box<dyn AnyRelation>],
    tx: &'a Transaction,
    applied: Cell<usize>,
}

impl CommitContext<'_> {
    fn store<T: Entity>(&self, phase: Phase) -> Result<&DataStore<T>, Failure> {
        lookup(self.stores, self.index).map_err(|source| Failure { entity: T::NAME, phase, source })
    }

    fn write<T: Entity>(
        &self, phase: Phase, kind: Operation, entity: &mut T,
    ) -> Result<(), Failure> {
        let adapter = self.store::<T>(phase)?.adapter();
        let result = match kind {
            Operation::Insert => adapter.create(self.tx, entity),
            Operation::Update => adapter.update(self.tx, entity),
            Operation::Delete => adapter.delete(self.tx, entity),
        };
        result.map_err(|source| Failure { entity: T::NAME, phase, source })?;
        self.applied.set(self.applied.get() + 1);
        Ok(())
    }

    fn cascade<T: Entity>(&self, phase: Phase, parent: &mut T) -> Result<(), Failure> {
        for relation in self.relations.iter().filter(|r| r.parent() == TypeId::of::<T>()) {
            relation.cascade(phase, parent, self)?;
        }
        Ok(())
    }
}

trait Batch {
    fn apply(&mut self, phase: Phase, ctx: &CommitContext<'_>) -> Result<(), Failure>;
    fn into_inserted(self: Box<Self>) -> (TypeId, Box<dyn Any>);
}

impl<T: Entity> Batch for Vec<PendingOperation<T>> {
    fn apply(&mut self, phase: Phase, ctx: &CommitContext<'_>) -> Result<(), Failure> {
        for op in self.iter_mut() {
            match (phase, op.kind) {
                (Phase::Insert, Operation::Insert) | (Phase::Update, Operation::Update) => {
                    ctx.write(phase, op.kind, &mut op.entity)?;
                    ctx.cascade(phase, &mut op.entity)?;
                }
                (Phase::Delete, Operation::Delete) => {
                    ctx.cascade(phase, &mut op.entity)?;
                    ctx.write(phase, op.kind, &mut op.entity)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn into_inserted(self: Box<Self>) -> (TypeId, Box<dyn Any>) {
        let inserted: Vec<T> = (*self)
            .into_iter()
            .filter(|op| op.kind == Operation::Insert)
            .map(|op| op.entity)
            .collect();
        (TypeId::of::<T>(), Box::new(inserted))
    }
}

trait AnyRelation {
    fn parent(&self) -> TypeId;
    fn child(&self) -> TypeId;
    fn cascade(
        &self, phase: Phase, parent: &mut dyn Any, ctx: &CommitContext<'_>,
    ) -> Result<(), Failure>;
    fn hydrate(&self, parent: &mut dyn Any, uow: &UnitOfWork) -> Result<()>;
}

struct Relation<P, C> {
    navigation: Navigation<P, C>,
    join: Join,
}

impl<P: Entity, C: Entity> AnyRelation for Relation<P, C> {
    fn parent(&self) -> TypeId {
        TypeId::of::<P>()
    }

    fn child(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn cascade(
        &self, phase: Phase, parent: &mut dyn Any, ctx: &CommitContext<'_>,
    ) -> Result<(), Failure> {
        let Some(parent) = parent.downcast_mut::<P>() else {
            return Ok(());
        };
        if (self.navigation)(parent).is_empty() {
            return Ok(());
        }

        let fail = |entity, source| Failure { entity, phase, source };
        let parent_value =
            read_field(parent, self.join.parent_field).map_err(|e| fail(P::NAME, e))?;
        let schema = ctx.store::<C>(phase)?.schema();

        for child in (self.navigation)(parent).iter_mut() {
            match phase {
                Phase::Insert => {
                    child
                        .set(self.join.child_field, parent_value.clone())
                        .map_err(|e| fail(C::NAME, e))?;
                    ctx.write(phase, Operation::Insert, child)?;
                    ctx.cascade(phase, child)?;
                }
                Phase::Update => {
                    child
                        .set(self.join.child_field, parent_value.clone())
                        .map_err(|e| fail(C::NAME, e))?;
                    if schema.is_transient(child) {
                        ctx.write(phase, Operation::Insert, child)?;
                        ctx.cascade(Phase::Insert, child)?;
                    } else {
                        ctx.write(phase, Operation::Update, child)?;
                        ctx.cascade(phase, child)?;
                    }
                }
                Phase::Delete => {
                    ctx.cascade(phase, child)?;
                    ctx.write(phase, Operation::Delete, child)?;
                }
                Phase::Commit => {}
            }
        }
        Ok(())
    }

    fn hydrate(&self, parent: &mut dyn Any, uow: &UnitOfWork) -> Result<()> {
        let Some(parent) = parent.downcast_mut::<P>() else {
            return Ok(());
        };
        let parent_value = read_field(parent, self.join.parent_field)?;
        let children = uow.find::<C>(&Specification::new(self.join.predicate(parent_value)))?;
        *(self.navigation)(parent) = children;
        Ok(())
    }
}
