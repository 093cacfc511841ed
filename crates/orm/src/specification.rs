use std::fmt;
use std::marker::PhantomData;

use crate::compile::Compiler;
use crate::entity::Entity;
use crate::error::Result;
use crate::evaluate::evaluate;
use crate::predicate::Expr;
use crate::query::Fragment;

/// A predicate bound to one entity type, consumed by adapters to select
/// entities.
pub struct Specification<T> {
    predicate: Expr,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Specification<T> {
    /// Wrap a predicate.
    #[must_use]
    pub const fn new(predicate: Expr) -> Self {
        Self { predicate, _entity: PhantomData }
    }

    /// Specification satisfied by every entity.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Expr::always())
    }

    /// The wrapped predicate.
    #[must_use]
    pub const fn predicate(&self) -> &Expr {
        &self.predicate
    }

    /// Whether `entity` satisfies the predicate.
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors for ill-typed predicates.
    pub fn is_satisfied_by(&self, entity: &T) -> Result<bool> {
        evaluate(&self.predicate, entity)
    }

    /// Compile the predicate into a `WHERE` fragment.
    ///
    /// # Errors
    ///
    /// Propagates compilation errors.
    pub fn to_fragment(&self, compiler: &Compiler) -> Result<Fragment> {
        compiler.compile::<T>(&self.predicate)
    }
}

impl<T: Entity> From<Expr> for Specification<T> {
    fn from(predicate: Expr) -> Self {
        Self::new(predicate)
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self { predicate: self.predicate.clone(), _entity: PhantomData }
    }
}

impl<T: Entity> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("entity", &T::NAME)
            .field("predicate", &self.predicate)
            .finish()
    }
}
