//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use crudstore_orm::{DataStore, Expr, Join, Specification, UnitOfWork, entity, int_enum};
use crudstore_sql::{Connection, SqlAdapter, SqliteConnection};
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

const PEOPLE: &str = "
    CREATE TABLE Person (
        person_id INTEGER PRIMARY KEY,
        firstname TEXT NOT NULL,
        lastname TEXT NOT NULL,
        active INTEGER NOT NULL,
        nickname TEXT
    );
    INSERT INTO Person VALUES (1, 'Hermann', 'Einstein', 1, NULL);
    INSERT INTO Person VALUES (2, 'Albert', 'Einstein', 1, NULL);
    INSERT INTO Person VALUES (3, 'Maja', 'Einstein', 1, NULL);
";

// an empty number violates the check, which is how tests force a failed write
const IDENTIFICATIONS: &str = "
    CREATE TABLE Identification (
        identification_id INTEGER PRIMARY KEY,
        person_id INTEGER NOT NULL,
        kind INTEGER NOT NULL,
        number TEXT NOT NULL CHECK (number <> '')
    );
    INSERT INTO Identification VALUES (1, 1, 1, '509-515-224');
    INSERT INTO Identification VALUES (2, 1, 2, '92-4267');
    INSERT INTO Identification VALUES (3, 2, 1, '425-428-336');
";

// foreign keys are only checked when the transaction commits
const DEFERRED_IDENTIFICATIONS: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE Identification (
        identification_id INTEGER PRIMARY KEY,
        person_id INTEGER NOT NULL
            REFERENCES Person (person_id) DEFERRABLE INITIALLY DEFERRED,
        kind INTEGER NOT NULL,
        number TEXT NOT NULL
    );
    INSERT INTO Identification VALUES (1, 1, 1, '509-515-224');
    INSERT INTO Identification VALUES (2, 1, 2, '92-4267');
    INSERT INTO Identification VALUES (3, 2, 1, '425-428-336');
";

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

pub fn by_person(person_id: i32) -> Specification<Person> {
    Specification::new(Expr::field("person_id").eq(person_id))
}

/// In-memory database with both tables created and seeded.
pub fn database() -> Arc<dyn Connection> {
    let conn = SqliteConnection::in_memory().expect("connect");
    conn.execute_batch(PEOPLE).expect("create people");
    conn.execute_batch(IDENTIFICATIONS).expect("create identifications");
    Arc::new(conn)
}

/// In-memory database whose identifications reference people through a
/// deferred foreign key.
pub fn deferred_database() -> Arc<dyn Connection> {
    let conn = SqliteConnection::in_memory().expect("connect");
    conn.execute_batch(PEOPLE).expect("create people");
    conn.execute_batch(DEFERRED_IDENTIFICATIONS).expect("create identifications");
    Arc::new(conn)
}

/// In-memory database with only the people table.
pub fn people_database() -> Arc<dyn Connection> {
    let conn = SqliteConnection::in_memory().expect("connect");
    conn.execute_batch(PEOPLE).expect("create people");
    Arc::new(conn)
}

/// In-memory database with only the identifications table.
pub fn identifications_database() -> Arc<dyn Connection> {
    let conn = SqliteConnection::in_memory().expect("connect");
    conn.execute_batch(IDENTIFICATIONS).expect("create identifications");
    Arc::new(conn)
}

/// Unit of work with person and identification stores on the given
/// connections and the person → identifications relationship mapped.
pub fn unit_of_work(
    people: &Arc<dyn Connection>, identifications: &Arc<dyn Connection>,
) -> UnitOfWork {
    let people = SqlAdapter::<Person>::new(Arc::clone(people)).expect("people adapter");
    let identifications = SqlAdapter::<Identification>::new(Arc::clone(identifications))
        .expect("identifications adapter");

    let mut uow = UnitOfWork::new();
    uow.register(DataStore::new(people))
        .map(|p: &mut Person| &mut p.identifications, Join::on("person_id", "person_id"))
        .expect("relationship");
    uow.register(DataStore::new(identifications));
    uow
}

/// Number of rows in `table`.
pub fn count(conn: &Arc<dyn Connection>, table: &str) -> usize {
    conn.query(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .expect("count")
        .first()
        .and_then(|row| row.get("n").cloned())
        .and_then(|value| match value {
            crudstore_orm::Value::Int(n) => usize::try_from(n).ok(),
            _ => None,
        })
        .expect("count value")
}

/// Route tracing output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    // a subscriber may already be installed by another test in this binary
    let _ = Registry::default()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
