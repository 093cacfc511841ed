//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use crudstore_orm::{
    Backend, CrudAdapter, EntitySchema, Error, InMemoryAdapter, Join, MemoryBackend, MemoryTable,
    Operation, Result, Specification, Transaction, UnitOfWork, Value, entity, int_enum,
    memory_table,
};
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

int_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum IdentificationType {
        #[default]
        Ssn = 1,
        Tin = 2,
    }
}

entity! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Person {
        pub person_id: i32,
        pub firstname: String,
        pub lastname: String,
        pub active: bool,
        pub nickname: Option<String>,
    }
    navigation {
        pub identifications: Vec<Identification>,
    }
}

entity! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Identification {
        pub identification_id: i32,
        pub person_id: i32,
        pub kind: IdentificationType,
        pub number: String,
    }
}

pub fn person(id: i32, firstname: &str) -> Person {
    Person {
        person_id: id,
        firstname: firstname.to_string(),
        lastname: "Einstein".to_string(),
        active: true,
        ..Person::default()
    }
}

pub fn identification(
    id: i32, person_id: i32, kind: IdentificationType, number: &str,
) -> Identification {
    Identification { identification_id: id, person_id, kind, number: number.to_string() }
}

pub fn people() -> Vec<Person> {
    vec![person(1, "Hermann"), person(2, "Albert"), person(3, "Maja")]
}

pub fn identifications() -> Vec<Identification> {
    vec![
        identification(1, 1, IdentificationType::Ssn, "509-515-224"),
        identification(2, 1, IdentificationType::Tin, "92-4267"),
        identification(3, 2, IdentificationType::Ssn, "425-428-336"),
    ]
}

pub fn by_person(person_id: i32) -> Specification<Person> {
    Specification::new(crudstore_orm::Expr::field("person_id").eq(person_id))
}

/// Log of adapter writes shared by every [`Probe`] of a test.
pub type WriteLog = Arc<Mutex<Vec<String>>>;

/// In-memory adapter that records its writes and can be told to fail one
/// kind of write.
pub struct Probe<T: crudstore_orm::Entity> {
    inner: InMemoryAdapter<T>,
    log: WriteLog,
    fail_on: Option<Operation>,
}

impl<T: crudstore_orm::Entity> Probe<T> {
    pub fn new(inner: InMemoryAdapter<T>, log: &WriteLog) -> Self {
        Self { inner, log: Arc::clone(log), fail_on: None }
    }

    pub const fn failing(mut self, kind: Operation) -> Self {
        self.fail_on = Some(kind);
        self
    }

    fn record(&self, kind: Operation, entity: &T) -> Result<()> {
        let key = self.inner.schema().key_value(entity)?;
        self.log.lock().push(format!("{kind:?} {} {key}", T::NAME));
        if self.fail_on == Some(kind) {
            return Err(Error::BackendExecution(anyhow::anyhow!("{} store is read-only", T::NAME)));
        }
        Ok(())
    }
}

impl<T: crudstore_orm::Entity> CrudAdapter<T> for Probe<T> {
    fn schema(&self) -> &EntitySchema {
        self.inner.schema()
    }

    fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.inner.backend()
    }

    fn create(&self, tx: &Transaction, entity: &mut T) -> Result<()> {
        self.record(Operation::Insert, entity)?;
        self.inner.create(tx, entity)
    }

    fn update(&self, tx: &Transaction, entity: &T) -> Result<()> {
        self.record(Operation::Update, entity)?;
        self.inner.update(tx, entity)
    }

    fn delete(&self, tx: &Transaction, entity: &T) -> Result<()> {
        self.record(Operation::Delete, entity)?;
        self.inner.delete(tx, entity)
    }

    fn read(&self, spec: &Specification<T>) -> Result<Vec<T>> {
        self.inner.read(spec)
    }

    fn read_raw(&self, query: &str, params: &[Value]) -> Result<Vec<T>> {
        self.inner.read_raw(query, params)
    }
}

/// Seeded people and identifications tables.
pub struct Tables {
    pub people: MemoryTable<Person>,
    pub identifications: MemoryTable<Identification>,
}

impl Tables {
    pub fn seeded() -> Self {
        Self { people: memory_table(people()), identifications: memory_table(identifications()) }
    }

    pub fn adapters(
        &self, backend: Option<&Arc<MemoryBackend>>,
    ) -> (InMemoryAdapter<Person>, InMemoryAdapter<Identification>) {
        let people = InMemoryAdapter::new(Arc::clone(&self.people)).unwrap();
        let identifications = InMemoryAdapter::new(Arc::clone(&self.identifications)).unwrap();
        match backend {
            Some(backend) => (people.in_backend(backend), identifications.in_backend(backend)),
            None => (people, identifications),
        }
    }
}

/// Unit of work over `people` and `identifications` with the
/// person → identifications relationship mapped.
pub fn unit_of_work(
    people: impl CrudAdapter<Person> + 'static,
    identifications: impl CrudAdapter<Identification> + 'static,
) -> UnitOfWork {
    let mut uow = UnitOfWork::new();
    uow.register(crudstore_orm::DataStore::new(people))
        .map(|p: &mut Person| &mut p.identifications, Join::on("person_id", "person_id"))
        .unwrap();
    uow.register(crudstore_orm::DataStore::new(identifications));
    uow
}

/// Route tracing output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    // a subscriber may already be installed by another test in this binary
    let _ = Registry::default()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
