//! Integration tests for the SQL adapter against an in-memory `SQLite`
//! database.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{
    IdentificationType, Person, by_person, count, database, deferred_database, identification,
    identifications_database, people_database, person, unit_of_work,
};
use crudstore_orm::{CrudAdapter, Dialect, Error, Expr, Phase, Specification, Transaction, Value};
use crudstore_sql::SqlAdapter;

#[test]
fn statements_follow_the_dialect() {
    let conn = database();

    let sql_server = SqlAdapter::<Person>::builder(Arc::clone(&conn))
        .dialect(Dialect::sql_server())
        .build()
        .unwrap();
    let stmts = sql_server.statements();
    assert_eq!(
        stmts.select,
        "SELECT [person_id], [firstname], [lastname], [active], [nickname] FROM [Person]"
    );
    assert_eq!(
        stmts.insert,
        "INSERT INTO [Person] ([firstname], [lastname], [active], [nickname]) \
         VALUES (@firstname, @lastname, @active, @nickname); SELECT CAST(SCOPE_IDENTITY() AS INT);"
    );
    assert_eq!(
        stmts.update.as_deref(),
        Some(
            "UPDATE [Person] SET [firstname] = @firstname, [lastname] = @lastname, \
             [active] = @active, [nickname] = @nickname WHERE [person_id] = @person_id"
        )
    );
    assert_eq!(stmts.delete, "DELETE [Person] WHERE [person_id] = @person_id");

    let sqlite = SqlAdapter::<Person>::builder(conn).table("People").build().unwrap();
    assert_eq!(sqlite.table(), "People");
    assert_eq!(sqlite.statements().delete, "DELETE FROM [People] WHERE [person_id] = @person_id");
    assert!(!sqlite.statements().insert.contains("SCOPE_IDENTITY"));
}

#[test]
fn read_compiles_predicates() {
    let adapter = SqlAdapter::<Person>::new(database()).unwrap();

    let expr = Expr::field("firstname").starts_with("Ma").or(Expr::field("person_id").is_in([1]));
    let found = adapter.read(&expr.into()).unwrap();
    let names: Vec<_> = found.iter().map(|p| p.firstname.as_str()).collect();
    assert_eq!(names, ["Hermann", "Maja"]);

    assert_eq!(adapter.read(&Specification::all()).unwrap().len(), 3);
    assert_eq!(adapter.read(&Expr::field("active").into()).unwrap().len(), 3);
    let nobody = Expr::field("person_id").is_in(Vec::<i32>::new());
    assert!(adapter.read(&nobody.into()).unwrap().is_empty());
    assert!(adapter.read(&(!Expr::field("active")).into()).unwrap().is_empty());
}

#[test]
fn create_assigns_generated_key() {
    let adapter = SqlAdapter::<Person>::new(database()).unwrap();
    let tx = Transaction::autocommit();

    let mut eduard = person(0, "Eduard");
    eduard.nickname = Some("Tete".to_string());
    adapter.create(&tx, &mut eduard).unwrap();
    assert_eq!(eduard.person_id, 4);

    let stored = adapter.read(&by_person(4)).unwrap();
    assert_eq!(stored, [eduard]);
}

#[test]
fn uow_reads_hydrate_children() {
    let conn = database();
    let uow = unit_of_work(&conn, &conn);

    let hermann = uow.find_single(&by_person(1)).unwrap();
    assert_eq!(hermann.firstname, "Hermann");
    let numbers: Vec<_> = hermann.identifications.iter().map(|i| i.number.as_str()).collect();
    assert_eq!(numbers, ["509-515-224", "92-4267"]);
    assert_eq!(hermann.identifications[1].kind, IdentificationType::Tin);

    let einsteins = Expr::field("lastname").eq("Einstein").into();
    let err = uow.find_single::<Person>(&einsteins).unwrap_err();
    assert!(matches!(err, Error::AmbiguousResult { entity: "Person", count: 3 }));
}

#[test]
fn uow_insert_cascades_foreign_key() {
    common::init_tracing();
    let conn = database();
    let mut uow = unit_of_work(&conn, &conn);

    let mut eduard = person(0, "Eduard");
    eduard.identifications.push(identification(0, 0, IdentificationType::Ssn, "123-456-789"));
    eduard.identifications.push(identification(0, 0, IdentificationType::Tin, "11-1111"));
    uow.add(eduard).unwrap();

    let committed = uow.commit().unwrap();
    assert_eq!(committed.applied(), 3);
    let eduard = &committed.inserted::<Person>()[0];
    assert_eq!(eduard.person_id, 4);
    assert!(eduard.identifications.iter().all(|i| i.person_id == 4));

    let stored = uow.find_single(&by_person(4)).unwrap();
    let keys: Vec<_> = stored.identifications.iter().map(|i| i.identification_id).collect();
    assert_eq!(keys, [4, 5]);
}

#[test]
fn uow_update_and_delete() {
    let conn = database();
    let mut uow = unit_of_work(&conn, &conn);

    let mut albert = uow.find_single(&by_person(2)).unwrap();
    albert.nickname = Some("Albertle".to_string());
    albert.identifications[0].number = "425-428-000".to_string();
    uow.update(albert).unwrap();

    let hermann = uow.find_single(&by_person(1)).unwrap();
    uow.delete(hermann).unwrap();
    uow.commit().unwrap();

    assert_eq!(count(&conn, "Person"), 2);
    assert_eq!(count(&conn, "Identification"), 1);

    let albert = uow.find_single(&by_person(2)).unwrap();
    assert_eq!(albert.nickname.as_deref(), Some("Albertle"));
    assert_eq!(albert.identifications[0].number, "425-428-000");
}

#[test]
fn shared_connection_commits_atomically() {
    common::init_tracing();
    let conn = database();
    let mut uow = unit_of_work(&conn, &conn);

    uow.update(person(2, "Alberto")).unwrap();
    let mut eduard = person(0, "Eduard");
    eduard.identifications.push(identification(0, 0, IdentificationType::Ssn, ""));
    uow.add(eduard).unwrap();

    let err = uow.commit().unwrap_err();
    let Error::Commit { applied, rolled_back, entity, phase, source } = err else {
        panic!("expected commit error, got {err}");
    };
    assert_eq!(applied, 1);
    assert!(rolled_back);
    assert_eq!(entity, "Identification");
    assert_eq!(phase, Phase::Insert);
    assert!(matches!(*source, Error::BackendExecution(_)));

    assert_eq!(count(&conn, "Person"), 3);
    assert_eq!(uow.find_single(&by_person(2)).unwrap().firstname, "Albert");
}

#[test]
fn refused_commit_rolls_back() {
    common::init_tracing();
    let conn = deferred_database();
    let mut uow = unit_of_work(&conn, &conn);

    uow.add(identification(0, 99, IdentificationType::Ssn, "111-22-333")).unwrap();
    let err = uow.commit().unwrap_err();
    let Error::Commit { applied, rolled_back, entity, phase, source } = err else {
        panic!("expected commit error, got {err}");
    };
    assert_eq!(applied, 1);
    assert!(rolled_back);
    assert_eq!(entity, "Identification");
    assert_eq!(phase, Phase::Commit);
    assert!(matches!(*source, Error::BackendExecution(_)));
    assert_eq!(count(&conn, "Identification"), 3);

    // the connection is usable for the next batch
    uow.add(identification(0, 1, IdentificationType::Tin, "11-1111")).unwrap();
    assert_eq!(uow.commit().unwrap().applied(), 1);
    assert_eq!(count(&conn, "Identification"), 4);
}

#[test]
fn separate_connections_report_boundary() {
    let people = people_database();
    let identifications = identifications_database();
    let mut uow = unit_of_work(&people, &identifications);

    let mut eduard = person(0, "Eduard");
    eduard.identifications.push(identification(0, 0, IdentificationType::Ssn, ""));
    uow.add(eduard).unwrap();

    let err = uow.commit().unwrap_err();
    assert!(matches!(
        err,
        Error::Commit {
            applied: 1,
            rolled_back: false,
            entity: "Identification",
            phase: Phase::Insert,
            ..
        }
    ));

    // the person write was not part of any transaction
    assert_eq!(count(&people, "Person"), 4);
    assert_eq!(count(&identifications, "Identification"), 3);
}

#[test]
fn raw_queries_and_commands() {
    let conn = database();
    let uow = unit_of_work(&conn, &conn);

    let found = uow
        .find_raw::<Person>(
            "SELECT * FROM [Person] WHERE [firstname] = @0 OR [firstname] = @1",
            &["Hermann".into(), "Maja".into()],
        )
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].identifications.len(), 2);

    let partial = uow
        .find_raw::<Person>("SELECT person_id FROM Person WHERE person_id = @0", &[3.into()])
        .unwrap_err();
    assert!(matches!(partial, Error::BackendExecution(_)));
    assert!(partial.to_string().contains("column firstname missing"));

    let adapter = SqlAdapter::<Person>::new(Arc::clone(&conn)).unwrap();
    let affected = adapter
        .execute("UPDATE Person SET active = @0 WHERE person_id > @1", &[false.into(), 1.into()])
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(adapter.read(&Expr::field("active").into()).unwrap().len(), 1);
    let inactive = Expr::field("active").eq(Value::Bool(false));
    assert_eq!(adapter.read(&inactive.into()).unwrap().len(), 2);
}

#[test]
fn mistyped_columns_fail_materialization() {
    let conn = database();
    let uow = unit_of_work(&conn, &conn);

    let err = uow
        .find_raw::<Person>(
            "SELECT 1 AS person_id, 'Hans' AS firstname, 'Einstein' AS lastname, \
             'yes' AS active, NULL AS nickname",
            &[],
        )
        .unwrap_err();
    assert!(
        matches!(err, Error::Materialization { ref field, ref value }
            if field == "active" && *value == Value::Text("yes".to_string())),
        "unexpected error: {err}"
    );

    let err = uow
        .find_raw::<Person>(
            "SELECT 1 AS person_id, NULL AS firstname, 'Einstein' AS lastname, \
             1 AS active, NULL AS nickname",
            &[],
        )
        .unwrap_err();
    assert!(
        matches!(err, Error::Materialization { ref field, value: Value::Null }
            if field == "firstname"),
        "unexpected error: {err}"
    );

    // nullable fields accept NULL
    let found = uow
        .find_raw::<Person>(
            "SELECT 1 AS person_id, 'Hans' AS firstname, 'Einstein' AS lastname, \
             0 AS active, NULL AS nickname",
            &[],
        )
        .unwrap();
    assert_eq!(found[0].nickname, None);
    assert!(!found[0].active);
}
