//! Store session: one connection plus per-session tracking state.
//!
//! # Responsibility
//! - Own the SQLite connection borrowed by repositories per call.
//! - Keep the first-level identity map of row snapshots.
//! - Queue update/delete statements until the next flush.
//! - Expose transaction boundaries to the context provider.
//!
//! # Invariants
//! - Queued writes execute in scheduling order; at most one queued write per
//!   entity key, a later write replaces an earlier one in place.
//! - A failed flush stops at the failing write, drops the rest of the queue
//!   and evicts every entity whose write did not land.
//! - `rollback` clears the identity map and the queue.
//! - A version bump handed to the caller for a write that never landed is
//!   remembered, so the caller's copy still passes the version check while
//!   the store holds the version it was read at.
//! - Dropping a session with queued writes discards them (logged).

use crate::config::StoreConfig;
use crate::db::migrations::Migration;
use crate::db::open_db;
use crate::model::entity::{EntityDescriptor, EntityKey, EntityRow};
use crate::model::value::FieldValue;
use crate::query::criteria::Statement;
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, info, warn};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Lock acquisition policy for `Session::begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Locks are taken lazily by the first read/write.
    #[default]
    Deferred,
    /// Takes the database write lock immediately.
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Update,
    Delete,
}

/// One statement waiting for the next flush.
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub(crate) key: EntityKey,
    pub(crate) entity: &'static str,
    pub(crate) id: String,
    pub(crate) kind: WriteKind,
    pub(crate) statement: Statement,
    /// Version the row must still carry in the store; `None` if unversioned.
    pub(crate) stored_version: Option<i64>,
    /// Version the entity carries once this write lands.
    pub(crate) next_version: Option<i64>,
}

/// Result of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Missing,
    Present { version: Option<i64> },
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    conn: Connection,
    identity_map: HashMap<EntityKey, EntityRow>,
    pending: Vec<PendingWrite>,
    /// `(stored, next)` versions of discarded versioned updates.
    unlanded: HashMap<EntityKey, (i64, i64)>,
}

impl Session {
    /// Opens a connection from `config` and applies `migrations`.
    pub fn open(config: &StoreConfig, migrations: &[Migration]) -> RepoResult<Self> {
        let conn = open_db(config, migrations)?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already configured connection.
    pub fn from_connection(conn: Connection) -> Self {
        let id = Uuid::new_v4();
        info!("event=session_open module=session status=ok session_id={id}");
        Self {
            id,
            conn,
            identity_map: HashMap::new(),
            pending: Vec::new(),
            unlanded: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Raw connection access for statements outside the repository contract.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn begin(&mut self, mode: TransactionMode) -> RepoResult<()> {
        if self.in_transaction() {
            return Err(RepoError::InvalidState("transaction already active"));
        }
        let sql = match mode {
            TransactionMode::Deferred => "BEGIN DEFERRED;",
            TransactionMode::Immediate => "BEGIN IMMEDIATE;",
        };
        self.conn.execute_batch(sql)?;
        debug!(
            "event=tx_begin module=session status=ok session_id={} mode={:?}",
            self.id, mode
        );
        Ok(())
    }

    /// Flushes queued writes, then commits.
    ///
    /// A failed flush leaves the transaction open for the caller to roll back.
    pub fn commit(&mut self) -> RepoResult<()> {
        if !self.in_transaction() {
            return Err(RepoError::InvalidState("no active transaction to commit"));
        }
        self.flush()?;
        self.conn.execute_batch("COMMIT;")?;
        debug!(
            "event=tx_commit module=session status=ok session_id={}",
            self.id
        );
        Ok(())
    }

    /// Discards queued writes and tracked snapshots, then rolls back any
    /// open transaction.
    pub fn rollback(&mut self) -> RepoResult<()> {
        let discarded = self.pending.len();
        self.clear();
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK;")?;
        }
        debug!(
            "event=tx_rollback module=session status=ok session_id={} discarded_writes={}",
            self.id, discarded
        );
        Ok(())
    }

    /// Executes every queued write in order; returns how many ran.
    ///
    /// A failing write stops the flush and the writes queued after it are
    /// discarded. Outside a transaction the writes that ran before it stay
    /// committed, so run multi-write flushes inside
    /// `OperationContext::with_transaction` when they must land together.
    pub fn flush(&mut self) -> RepoResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let started_at = Instant::now();
        let writes = std::mem::take(&mut self.pending);
        let total = writes.len();
        for (index, write) in writes.iter().enumerate() {
            if let Err(err) = self.apply(write) {
                for dropped in &writes[index..] {
                    self.identity_map.remove(&dropped.key);
                    self.remember_unlanded(dropped);
                }
                warn!(
                    "event=session_flush module=session status=error session_id={} entity={} id={} discarded_writes={} error={}",
                    self.id,
                    write.entity,
                    write.id,
                    total - index - 1,
                    err
                );
                return Err(err);
            }
        }

        debug!(
            "event=session_flush module=session status=ok session_id={} writes={} duration_ms={}",
            self.id,
            total,
            started_at.elapsed().as_millis()
        );
        Ok(total)
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.identity_map.len()
    }

    pub fn is_tracked(&self, key: &EntityKey) -> bool {
        self.identity_map.contains_key(key)
    }

    /// Forgets all tracking state without touching the store.
    pub fn clear(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for write in &pending {
            self.remember_unlanded(write);
        }
        self.identity_map.clear();
    }

    pub(crate) fn tracked(&self, key: &EntityKey) -> Option<&EntityRow> {
        self.identity_map.get(key)
    }

    pub(crate) fn track(&mut self, key: EntityKey, row: EntityRow) {
        self.identity_map.insert(key, row);
    }

    pub(crate) fn untrack(&mut self, key: &EntityKey) -> Option<EntityRow> {
        self.identity_map.remove(key)
    }

    pub(crate) fn pending_for(&self, key: &EntityKey) -> Option<&PendingWrite> {
        self.pending.iter().find(|write| write.key == *key)
    }

    pub(crate) fn schedule(&mut self, write: PendingWrite) {
        self.unlanded.remove(&write.key);
        match self.pending.iter_mut().find(|queued| queued.key == write.key) {
            Some(queued) => *queued = write,
            None => self.pending.push(write),
        }
    }

    /// Drops a queued update for `key`; queued deletes stay.
    pub(crate) fn cancel_update(&mut self, key: &EntityKey) -> bool {
        let Some(index) = self
            .pending
            .iter()
            .position(|write| write.key == *key && write.kind == WriteKind::Update)
        else {
            return false;
        };
        let write = self.pending.remove(index);
        self.remember_unlanded(&write);
        true
    }

    /// Maps a caller-held version back to the stored one when it came from
    /// an update that never landed and the store has not moved since.
    pub(crate) fn effective_version(
        &self,
        key: &EntityKey,
        held: Option<i64>,
        current: i64,
    ) -> Option<i64> {
        match self.unlanded.get(key) {
            Some(&(stored, next)) if held == Some(next) && current == stored => Some(stored),
            _ => held,
        }
    }

    pub(crate) fn execute(&self, statement: &Statement) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        Ok(changed)
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Runs a select over `descriptor.select_columns()` and copies the rows.
    pub(crate) fn fetch_rows(
        &self,
        descriptor: &EntityDescriptor,
        statement: &Statement,
    ) -> RepoResult<Vec<EntityRow>> {
        let columns = descriptor.select_columns();
        let mut stmt = self.conn.prepare(&statement.sql)?;
        let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
        let mut loaded = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let value = FieldValue::from_value_ref(row.get_ref(index)?).map_err(|err| {
                    RepoError::InvalidData(format!(
                        "{}.{column} holds invalid UTF-8: {err}",
                        descriptor.table
                    ))
                })?;
                values.push((*column, value));
            }
            loaded.push(EntityRow::new(descriptor.name, values));
        }

        Ok(loaded)
    }

    pub(crate) fn fetch_count(&self, statement: &Statement) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            &statement.sql,
            params_from_iter(statement.params.iter()),
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    pub(crate) fn probe(&self, statement: &Statement) -> RepoResult<Probe> {
        let found = self
            .conn
            .query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(match found {
            Some(version) => Probe::Present { version },
            None => Probe::Missing,
        })
    }

    fn remember_unlanded(&mut self, write: &PendingWrite) {
        if let (Some(stored), Some(next)) = (write.stored_version, write.next_version) {
            self.unlanded.insert(write.key.clone(), (stored, next));
        }
    }

    fn apply(&self, write: &PendingWrite) -> RepoResult<()> {
        if self.execute(&write.statement)? > 0 {
            return Ok(());
        }
        Err(match write.stored_version {
            Some(expected) => RepoError::Concurrency {
                entity: write.entity,
                id: write.id.clone(),
                expected: Some(expected),
                found: None,
            },
            None => RepoError::NotFound {
                entity: write.entity,
                id: write.id.clone(),
            },
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            debug!(
                "event=session_close module=session status=ok session_id={}",
                self.id
            );
        } else {
            warn!(
                "event=session_close module=session status=discarded session_id={} pending_writes={}",
                self.id,
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingWrite, Session, TransactionMode, WriteKind};
    use crate::model::entity::{EntityDescriptor, EntityKey, EntityRow, IdStrategy};
    use crate::model::value::FieldValue;
    use crate::query::criteria::Statement;
    use crate::repo::error::RepoError;
    use rusqlite::Connection;

    static ITEM: EntityDescriptor = EntityDescriptor {
        name: "Item",
        table: "items",
        id_column: "id",
        columns: &["label"],
        version_column: None,
        id_strategy: IdStrategy::Generated,
    };

    fn session_with_items() -> Session {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
             INSERT INTO items (id, label) VALUES (1, 'one'), (2, 'two');",
        )
        .unwrap();
        Session::from_connection(conn)
    }

    fn relabel(id: i64, label: &str) -> PendingWrite {
        let id_value = FieldValue::Integer(id);
        PendingWrite {
            key: EntityKey::new(&ITEM, &id_value),
            entity: ITEM.name,
            id: id.to_string(),
            kind: WriteKind::Update,
            statement: Statement {
                sql: "UPDATE items SET label = ? WHERE id = ?".to_string(),
                params: vec![FieldValue::from(label), id_value],
            },
            stored_version: None,
            next_version: None,
        }
    }

    fn label_of(session: &Session, id: i64) -> String {
        session
            .connection()
            .query_row("SELECT label FROM items WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn later_write_for_same_key_replaces_queued_one() {
        let mut session = session_with_items();
        session.schedule(relabel(1, "first"));
        session.schedule(relabel(2, "other"));
        session.schedule(relabel(1, "second"));
        assert_eq!(session.pending_writes(), 2);

        assert_eq!(session.flush().unwrap(), 2);
        assert_eq!(label_of(&session, 1), "second");
        assert_eq!(label_of(&session, 2), "other");
        assert_eq!(session.pending_writes(), 0);
    }

    #[test]
    fn failed_flush_reports_not_found_and_drops_remaining_writes() {
        let mut session = session_with_items();
        session.schedule(relabel(99, "ghost"));
        session.schedule(relabel(2, "never"));

        let err = session.flush().unwrap_err();
        assert!(matches!(err, RepoError::NotFound { entity: "Item", ref id } if id == "99"));
        assert_eq!(session.pending_writes(), 0);
        assert_eq!(label_of(&session, 2), "two");
    }

    #[test]
    fn rollback_discards_queue_and_transaction() {
        let mut session = session_with_items();
        session.begin(TransactionMode::Deferred).unwrap();
        session
            .connection()
            .execute("DELETE FROM items WHERE id = 1", [])
            .unwrap();
        session.schedule(relabel(2, "dropped"));

        session.rollback().unwrap();
        assert!(!session.in_transaction());
        assert_eq!(session.pending_writes(), 0);
        assert_eq!(label_of(&session, 1), "one");
        assert_eq!(label_of(&session, 2), "two");
    }

    #[test]
    fn transaction_boundaries_are_checked() {
        let mut session = session_with_items();
        assert!(matches!(
            session.commit(),
            Err(RepoError::InvalidState(_))
        ));

        session.begin(TransactionMode::Immediate).unwrap();
        assert!(matches!(
            session.begin(TransactionMode::Deferred),
            Err(RepoError::InvalidState(_))
        ));

        session.schedule(relabel(1, "committed"));
        session.commit().unwrap();
        assert_eq!(label_of(&session, 1), "committed");
    }

    #[test]
    fn discarded_versioned_update_maps_bumped_version_back() {
        let mut session = session_with_items();
        let key = EntityKey::new(&ITEM, &FieldValue::Integer(1));
        let mut write = relabel(1, "bumped");
        write.stored_version = Some(3);
        write.next_version = Some(4);

        session.schedule(write.clone());
        assert_eq!(session.effective_version(&key, Some(4), 3), Some(4));
        assert!(session.cancel_update(&key));
        assert_eq!(session.effective_version(&key, Some(4), 3), Some(3));
        assert_eq!(session.effective_version(&key, Some(4), 5), Some(4));
        assert_eq!(session.effective_version(&key, Some(3), 3), Some(3));

        session.schedule(write);
        session.clear();
        assert_eq!(session.effective_version(&key, Some(4), 3), Some(3));
    }

    #[test]
    fn failed_flush_untracks_every_dropped_write() {
        let mut session = session_with_items();
        let kept = EntityKey::new(&ITEM, &FieldValue::Integer(1));
        let dropped = EntityKey::new(&ITEM, &FieldValue::Integer(2));
        for id in [1, 2] {
            let key = EntityKey::new(&ITEM, &FieldValue::Integer(id));
            let row = EntityRow::new(ITEM.name, vec![("id", FieldValue::Integer(id))]);
            session.track(key, row);
        }
        session.schedule(relabel(99, "ghost"));
        session.schedule(relabel(2, "never"));

        assert!(session.flush().is_err());
        assert!(session.is_tracked(&kept));
        assert!(!session.is_tracked(&dropped));
    }

    #[test]
    fn cancel_update_keeps_deletes() {
        let mut session = session_with_items();
        let mut delete = relabel(2, "unused");
        delete.kind = WriteKind::Delete;
        session.schedule(relabel(1, "x"));
        session.schedule(delete);

        assert!(session.cancel_update(&EntityKey::new(&ITEM, &FieldValue::Integer(1))));
        assert!(!session.cancel_update(&EntityKey::new(&ITEM, &FieldValue::Integer(2))));
        assert_eq!(session.pending_writes(), 1);
    }
}
