use rusqlite::Connection;
use upartners_core::db::migrations::latest_version;
use upartners_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "orgs",
        "users",
        "org_roles",
        "partners",
        "user_profiles",
        "groups",
        "labels",
        "label_partners",
        "cases",
        "case_labels",
        "case_actions",
        "message_exports",
        "pending_tasks",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("upartners.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "cases");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn case_actions_cannot_be_updated() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO orgs (name) VALUES ('org');
         INSERT INTO users (username) VALUES ('admin@example.com');
         INSERT INTO partners (org_id, name) VALUES (1, 'Helpers');
         INSERT INTO cases (org_id, assignee_id, contact_uuid, message_id, message_on, summary, opened_on)
             VALUES (1, 1, 'C-1', 100, 0, 'hi', 0);
         INSERT INTO case_actions (case_id, action, created_by, created_on) VALUES (1, 'O', 1, 0);",
    )
    .unwrap();

    let err = conn
        .execute("UPDATE case_actions SET note = 'edited' WHERE id = 1;", [])
        .unwrap_err();
    assert!(err.to_string().contains("immutable"));
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO partners (org_id, name) VALUES (42, 'orphan');",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
