//! SQLite migration executor.
//!
//! # Responsibility
//! - Apply caller-registered schema migrations atomically.
//! - Refuse databases written by a newer schema.
//!
//! # Invariants
//! - `version` values must strictly increase across the slice.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// One schema step owned by the application embedding the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, sql: &'static str) -> Self {
        Self { version, sql }
    }
}

/// Returns the latest version declared by `migrations`.
pub fn latest_version(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    ensure_increasing(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

/// Reads the schema version recorded in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn ensure_increasing(migrations: &[Migration]) -> DbResult<()> {
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(DbError::InvalidMigrationOrder {
                previous: pair[0].version,
                next: pair[1].version,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, Migration};
    use crate::db::DbError;
    use rusqlite::Connection;

    const STEPS: &[Migration] = &[
        Migration::new(1, "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
        Migration::new(2, "CREATE TABLE b (id INTEGER PRIMARY KEY);"),
    ];

    #[test]
    fn applies_pending_steps_only() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, &STEPS[..1]).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), 1);

        apply_migrations(&mut conn, STEPS).unwrap();
        assert_eq!(current_user_version(&conn).unwrap(), latest_version(STEPS));
    }

    #[test]
    fn empty_registry_is_version_zero() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn, &[]).unwrap();
        assert_eq!(latest_version(&[]), 0);
        assert_eq!(current_user_version(&conn).unwrap(), 0);
    }

    #[test]
    fn rejects_non_increasing_versions() {
        let mut conn = Connection::open_in_memory().unwrap();
        let steps = [STEPS[1], STEPS[0]];
        let err = apply_migrations(&mut conn, &steps).unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidMigrationOrder {
                previous: 2,
                next: 1
            }
        ));
    }
}
