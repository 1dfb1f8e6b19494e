mod common;

use common::MIGRATIONS;
use repokit_core::db::migrations::{current_user_version, latest_version};
use repokit_core::db::schema::table_exists;
use repokit_core::{open_db, DbError, Migration, StoreConfig};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db(&StoreConfig::in_memory(), MIGRATIONS).unwrap();

    assert_eq!(current_user_version(&conn).unwrap(), latest_version(MIGRATIONS));
    assert!(table_exists(&conn, "widgets").unwrap());
    assert!(table_exists(&conn, "gadgets").unwrap());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("repokit.db"));

    let first = open_db(&config, MIGRATIONS).unwrap();
    first
        .execute("INSERT INTO widgets (name, weight) VALUES ('kept', 1)", [])
        .unwrap();
    drop(first);

    let second = open_db(&config, MIGRATIONS).unwrap();
    assert_eq!(current_user_version(&second).unwrap(), 2);
    let kept: i64 = second
        .query_row("SELECT COUNT(*) FROM widgets", [], |row| row.get(0))
        .unwrap();
    assert_eq!(kept, 1);
}

#[test]
fn later_migrations_apply_on_top_of_existing_schema() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("upgrade.db"));

    drop(open_db(&config, &MIGRATIONS[..1]).unwrap());
    let conn = open_db(&config, MIGRATIONS).unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), 2);
    assert!(table_exists(&conn, "gadgets").unwrap());
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&StoreConfig::file(&path), MIGRATIONS).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn migrations_must_strictly_increase() {
    let shuffled = [
        Migration::new(2, "CREATE TABLE b (id INTEGER PRIMARY KEY);"),
        Migration::new(2, "CREATE TABLE c (id INTEGER PRIMARY KEY);"),
    ];
    let err = open_db(&StoreConfig::in_memory(), &shuffled).unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidMigrationOrder {
            previous: 2,
            next: 2
        }
    ));
}

#[test]
fn failing_migration_leaves_schema_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");
    let broken = [
        Migration::new(1, "CREATE TABLE first (id INTEGER PRIMARY KEY);"),
        Migration::new(2, "CREATE TABLE oops (;"),
    ];

    assert!(matches!(
        open_db(&StoreConfig::file(&path), &broken),
        Err(DbError::Sqlite(_))
    ));

    let conn = Connection::open(&path).unwrap();
    assert_eq!(current_user_version(&conn).unwrap(), 0);
    assert!(!table_exists(&conn, "first").unwrap());
}
