//! Generic data access over pluggable CRUD adapters.
//!
//! Predicates are trees of [`Expr`] nodes. Backends compile them into
//! parameterized SQL fragments with a [`Compiler`]; the in-memory adapter
//! evaluates them in place. Mutations are buffered in [`DataStore`]s and
//! applied by a [`UnitOfWork`], which also hydrates navigation collections
//! through declared relationships.
//!
//! # Quick Start
//!
//! ## Define Entities
//!
//! ```ignore
//! entity! {
//!     #[derive(Debug, Clone, Default)]
//!     pub struct Person {
//!         pub person_id: i32,
//!         pub firstname: String,
//!         pub lastname: String,
//!     }
//!     navigation {
//!         pub identifications: Vec<Identification>,
//!     }
//! }
//!
//! entity! {
//!     #[derive(Debug, Clone, Default)]
//!     pub struct Identification {
//!         pub identification_id: i32,
//!         pub person_id: i32,
//!         pub number: String,
//!     }
//! }
//! ```
//!
//! The key is found by convention (`id` or `{entity}_id`) and, when it is an
//! integer, generated by the store on create.
//!
//! ## Compile a Predicate
//!
//! ```ignore
//! let expr = Expr::field("lastname").eq("Einstein").and(Expr::field("firstname").starts_with("Al"));
//! let fragment = Compiler::new().compile::<Person>(&expr)?;
//! // (([lastname] = @0) AND ([firstname] LIKE @1))  with @0 = 'Einstein', @1 = 'Al%'
//! ```
//!
//! ## Unit of Work
//!
//! ```ignore
//! let backend = MemoryBackend::new("people");
//! let people = InMemoryAdapter::new(memory_table(Vec::new()))?.in_backend(&backend);
//! let ids = InMemoryAdapter::new(memory_table(Vec::new()))?.in_backend(&backend);
//!
//! let mut uow = UnitOfWork::new();
//! uow.register(DataStore::new(people))
//!     .map(|p: &mut Person| &mut p.identifications, Join::on("person_id", "person_id"))?;
//! uow.register(DataStore::new(ids));
//!
//! uow.add(person)?;
//! uow.commit()?;
//!
//! let einsteins = uow.find::<Person>(&Expr::field("lastname").eq("Einstein").into())?;
//! ```

mod adapter;
mod compile;
mod entity;
mod error;
mod evaluate;
mod memory;
mod predicate;
mod query;
mod specification;
mod store;
mod unit_of_work;
mod value;

pub use adapter::{Backend, CrudAdapter, Transaction, same_backend};
pub use compile::Compiler;
pub use entity::{
    Captured, Entity, EntitySchema, FieldDef, FieldDescriptor, FieldRole, KeyKind, Record,
    read_field,
};
pub use error::{Error, Phase, Result};
pub use evaluate::evaluate;
pub use memory::{InMemoryAdapter, MemoryBackend, MemoryTable, memory_table};
pub use predicate::{BinaryOp, Expr, MatchKind, UnaryOp};
pub use query::{Dialect, Fragment, Parameter, literal};
pub use specification::Specification;
pub use store::{DataStore, Operation, PendingOperation};
pub use unit_of_work::{Committed, Join, Navigation, Registration, UnitOfWork};
pub use value::{DATETIME_FORMAT, FieldType, FieldValue, ScalarType, Value};
