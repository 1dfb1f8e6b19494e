//! Generic entity repository over a session provider.
//!
//! # Responsibility
//! - Provide CRUD, unique lookups, counting and listing for any `Entity`.
//! - Route every statement through the session borrowed from the context.
//!
//! # Invariants
//! - The repository never opens, commits or closes sessions.
//! - Reads, counts and inserts flush queued writes first.
//! - Update/delete check existence and version at call time; the statement
//!   itself is queued until the next flush.
//! - A session borrow never outlives one repository call.

use crate::db::schema::{table_columns, table_exists};
use crate::model::entity::{
    checked_values, Entity, EntityDescriptor, EntityKey, EntityRow, IdStrategy,
};
use crate::model::value::FieldValue;
use crate::query::criteria::{
    delete_statement, insert_statement, lock_statement, probe_statement, update_statement,
    Criteria,
};
use crate::query::filter::{FilterSet, OrderSpec};
use crate::query::page::{PageRequest, PagedResult};
use crate::repo::error::{RepoError, RepoResult};
use crate::session::context::SessionProvider;
use crate::session::handle::{PendingWrite, Probe, Session, WriteKind};
use log::debug;
use rusqlite::types::{FromSql, ValueRef};
use rusqlite::Connection;
use std::cell::RefMut;
use std::marker::PhantomData;

/// First version assigned to a newly saved versioned entity.
pub const INITIAL_VERSION: i64 = 1;

/// Data access contract for one entity type.
pub trait Repository<T: Entity> {
    /// Inserts `entity`; assigns a generated identity when it has none.
    /// Versioned entities are stored at `INITIAL_VERSION`.
    fn save(&self, entity: &mut T) -> RepoResult<()>;

    /// Queues a full-row update for an existing identity.
    fn update(&self, entity: &mut T) -> RepoResult<()>;

    fn save_or_update(&self, entity: &mut T) -> RepoResult<()>;

    /// Queues removal of an existing identity. Not idempotent.
    fn delete(&self, entity: &T) -> RepoResult<()>;

    /// Flushes the session, then reloads `entity` from the store.
    fn refresh(&self, entity: &mut T) -> RepoResult<()>;

    /// Detaches `entity` from the session without touching the store.
    fn evict(&self, entity: &T) -> RepoResult<()>;

    fn get(&self, id: &T::Id) -> RepoResult<Option<T>>;

    /// `lock == true` requires an active transaction and holds the store's
    /// write lock until it ends.
    fn get_with_lock(&self, id: &T::Id, lock: bool) -> RepoResult<Option<T>>;

    /// Unique lookup by one property; `MultipleResults` for 2+ rows.
    fn get_by_column(&self, column: &str, value: impl Into<FieldValue>) -> RepoResult<Option<T>>;

    fn get_by_criteria(&self, filters: &FilterSet) -> RepoResult<Option<T>>;

    fn verify_id(&self, id: &T::Id) -> RepoResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    fn count(&self, filters: Option<&FilterSet>) -> RepoResult<u64>;

    fn list_all(&self, filters: Option<&FilterSet>, order: Option<&OrderSpec>)
        -> RepoResult<Vec<T>>;

    /// Counts first, then loads the requested window.
    fn list_page(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>>;

    /// A missing or blank `property` means unordered.
    fn list_all_ascending(
        &self,
        filters: Option<&FilterSet>,
        property: Option<&str>,
    ) -> RepoResult<Vec<T>> {
        let order = property.and_then(|name| OrderSpec::asc(name));
        self.list_all(filters, order.as_ref())
    }

    fn list_all_descending(
        &self,
        filters: Option<&FilterSet>,
        property: Option<&str>,
    ) -> RepoResult<Vec<T>> {
        let order = property.and_then(|name| OrderSpec::desc(name));
        self.list_all(filters, order.as_ref())
    }

    fn list_page_ascending(
        &self,
        filters: Option<&FilterSet>,
        property: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>> {
        let order = property.and_then(|name| OrderSpec::asc(name));
        self.list_page(filters, order.as_ref(), page)
    }

    fn list_page_descending(
        &self,
        filters: Option<&FilterSet>,
        property: Option<&str>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>> {
        let order = property.and_then(|name| OrderSpec::desc(name));
        self.list_page(filters, order.as_ref(), page)
    }
}

/// SQLite-backed repository bound to one context.
pub struct SqliteRepository<'ctx, T> {
    context: &'ctx dyn SessionProvider,
    _entity: PhantomData<fn() -> T>,
}

impl<'ctx, T: Entity> SqliteRepository<'ctx, T> {
    /// Validates the descriptor and verifies its table shape.
    ///
    /// # Errors
    /// - `InvalidDescriptor` for malformed or duplicated identifiers, or a
    ///   generated identity whose id type cannot hold a rowid.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema does
    ///   not carry the descriptor's columns.
    pub fn try_new(context: &'ctx dyn SessionProvider) -> RepoResult<Self> {
        let descriptor = T::descriptor();
        descriptor.validate()?;
        if descriptor.id_strategy == IdStrategy::Generated
            && <T::Id as FromSql>::column_result(ValueRef::Integer(1)).is_err()
        {
            return Err(RepoError::InvalidDescriptor(format!(
                "{}: generated ids need an integer id type",
                descriptor.name
            )));
        }
        {
            let session = context.session()?;
            ensure_table_ready(session.connection(), descriptor)?;
        }
        Ok(Self {
            context,
            _entity: PhantomData,
        })
    }

    /// Binds without re-reading the schema; the caller has already passed
    /// `try_new` for this context.
    pub(crate) fn verified(context: &'ctx dyn SessionProvider) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    fn session(&self) -> RepoResult<RefMut<'ctx, Session>> {
        self.context.session()
    }
}

impl<T: Entity> Repository<T> for SqliteRepository<'_, T> {
    fn save(&self, entity: &mut T) -> RepoResult<()> {
        let descriptor = T::descriptor();
        let mut session = self.session()?;
        session.flush()?;

        let assigned = entity.id();
        let mut columns: Vec<&'static str> = Vec::with_capacity(descriptor.columns.len() + 2);
        let mut params: Vec<FieldValue> = Vec::with_capacity(descriptor.columns.len() + 2);
        match (&assigned, descriptor.id_strategy) {
            (Some(id), _) => {
                columns.push(descriptor.id_column);
                params.push(id.clone().into());
            }
            (None, IdStrategy::Assigned) => {
                return Err(RepoError::TransientEntity {
                    entity: descriptor.name,
                })
            }
            (None, IdStrategy::Generated) => {}
        }
        columns.extend_from_slice(descriptor.columns);
        params.extend(checked_values(entity)?);

        let version = descriptor.version_column.map(|version_column| {
            columns.push(version_column);
            params.push(FieldValue::Integer(INITIAL_VERSION));
            INITIAL_VERSION
        });

        session.execute(&insert_statement(descriptor, &columns, params))?;

        if assigned.is_none() {
            let rowid = session.last_insert_rowid();
            let id = <T::Id as FromSql>::column_result(ValueRef::Integer(rowid)).map_err(|err| {
                RepoError::InvalidData(format!(
                    "generated id {rowid} does not fit {}: {err}",
                    descriptor.name
                ))
            })?;
            entity.set_id(id);
        }
        if let Some(version) = version {
            entity.set_version(version);
        }

        let snapshot = EntityRow::snapshot(entity)?;
        let key = key_of(entity)?;
        debug!(
            "event=entity_save module=repo status=ok entity={} id={}",
            descriptor.name,
            display_id(snapshot.value(descriptor.id_column))
        );
        session.track(key, snapshot);
        Ok(())
    }

    fn update(&self, entity: &mut T) -> RepoResult<()> {
        let descriptor = T::descriptor();
        let id_value = require_id(entity)?;
        let key = EntityKey::new(descriptor, &id_value);
        let values = checked_values(entity)?;
        let mut session = self.session()?;

        let state = row_state(&session, descriptor, &key, &id_value)?;
        let version = match descriptor.version_column {
            Some(_) => {
                let current = state.versioned_current(descriptor, &id_value)?;
                let held = session.effective_version(&key, entity.version(), current);
                check_version(descriptor, &id_value, held, Some(current))?;
                Some((state.stored.unwrap_or(current), current + 1))
            }
            None => None,
        };

        let statement = update_statement(descriptor, values, id_value.clone(), version);
        session.schedule(PendingWrite {
            key: key.clone(),
            entity: descriptor.name,
            id: id_value.to_string(),
            kind: WriteKind::Update,
            statement,
            stored_version: version.map(|(stored, _)| stored),
            next_version: version.map(|(_, next)| next),
        });
        if let Some((_, next)) = version {
            entity.set_version(next);
        }
        session.track(key, EntityRow::snapshot(entity)?);

        debug!(
            "event=entity_update module=repo status=queued entity={} id={} pending_writes={}",
            descriptor.name,
            id_value,
            session.pending_writes()
        );
        Ok(())
    }

    fn save_or_update(&self, entity: &mut T) -> RepoResult<()> {
        let descriptor = T::descriptor();
        let Some(id) = entity.id() else {
            return self.save(entity);
        };
        match descriptor.id_strategy {
            IdStrategy::Generated => self.update(entity),
            IdStrategy::Assigned => {
                let id_value: FieldValue = id.into();
                let key = EntityKey::new(descriptor, &id_value);
                let exists = {
                    let session = self.session()?;
                    match row_state(&session, descriptor, &key, &id_value) {
                        Ok(_) => true,
                        Err(RepoError::NotFound { .. }) => false,
                        Err(err) => return Err(err),
                    }
                };
                if exists {
                    self.update(entity)
                } else {
                    self.save(entity)
                }
            }
        }
    }

    fn delete(&self, entity: &T) -> RepoResult<()> {
        let descriptor = T::descriptor();
        let id_value = require_id(entity)?;
        let key = EntityKey::new(descriptor, &id_value);
        let mut session = self.session()?;

        let state = row_state(&session, descriptor, &key, &id_value)?;
        if descriptor.version_column.is_some() {
            let current = state.versioned_current(descriptor, &id_value)?;
            let held = session.effective_version(&key, entity.version(), current);
            check_version(descriptor, &id_value, held, Some(current))?;
        }

        let statement = delete_statement(descriptor, id_value.clone(), state.stored);
        session.schedule(PendingWrite {
            key: key.clone(),
            entity: descriptor.name,
            id: id_value.to_string(),
            kind: WriteKind::Delete,
            statement,
            stored_version: state.stored,
            next_version: None,
        });
        session.untrack(&key);

        debug!(
            "event=entity_delete module=repo status=queued entity={} id={} pending_writes={}",
            descriptor.name,
            id_value,
            session.pending_writes()
        );
        Ok(())
    }

    fn refresh(&self, entity: &mut T) -> RepoResult<()> {
        let descriptor = T::descriptor();
        let id_value = require_id(entity)?;
        let key = EntityKey::new(descriptor, &id_value);
        let mut session = self.session()?;

        session.flush()?;
        session.untrack(&key);
        let row = load_row(&session, descriptor, &id_value)?.ok_or_else(|| RepoError::NotFound {
            entity: descriptor.name,
            id: id_value.to_string(),
        })?;
        *entity = T::from_row(&row)?;
        session.track(key, row);

        debug!(
            "event=entity_refresh module=repo status=ok entity={} id={}",
            descriptor.name, id_value
        );
        Ok(())
    }

    fn evict(&self, entity: &T) -> RepoResult<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        let key = EntityKey::of::<T>(&id);
        let mut session = self.session()?;
        let tracked = session.untrack(&key).is_some();
        let cancelled = session.cancel_update(&key);
        debug!(
            "event=entity_evict module=repo status=ok entity={} id={:?} tracked={} cancelled_update={}",
            T::descriptor().name,
            id,
            tracked,
            cancelled
        );
        Ok(())
    }

    fn get(&self, id: &T::Id) -> RepoResult<Option<T>> {
        let descriptor = T::descriptor();
        let id_value: FieldValue = id.clone().into();
        let key = EntityKey::new(descriptor, &id_value);
        let mut session = self.session()?;
        session.flush()?;

        if let Some(row) = session.tracked(&key) {
            return T::from_row(row).map(Some);
        }
        match load_row(&session, descriptor, &id_value)? {
            Some(row) => {
                let entity = T::from_row(&row)?;
                session.track(key, row);
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    fn get_with_lock(&self, id: &T::Id, lock: bool) -> RepoResult<Option<T>> {
        if !lock {
            return self.get(id);
        }

        let descriptor = T::descriptor();
        let id_value: FieldValue = id.clone().into();
        let key = EntityKey::new(descriptor, &id_value);
        let mut session = self.session()?;
        if !session.in_transaction() {
            return Err(RepoError::InvalidState(
                "row lock requires an active transaction",
            ));
        }
        session.flush()?;

        let locked = session.execute(&lock_statement(descriptor, id_value.clone()))?;
        session.untrack(&key);
        if locked == 0 {
            return Ok(None);
        }
        let Some(row) = load_row(&session, descriptor, &id_value)? else {
            return Ok(None);
        };
        let entity = T::from_row(&row)?;
        session.track(key, row);

        debug!(
            "event=entity_lock module=repo status=ok entity={} id={} session_id={}",
            descriptor.name,
            id_value,
            session.id()
        );
        Ok(Some(entity))
    }

    fn get_by_column(&self, column: &str, value: impl Into<FieldValue>) -> RepoResult<Option<T>> {
        self.get_by_criteria(&FilterSet::new().with(column, value))
    }

    fn get_by_criteria(&self, filters: &FilterSet) -> RepoResult<Option<T>> {
        let descriptor = T::descriptor();
        let criteria = Criteria::build(descriptor, Some(filters), None)?;
        let mut session = self.session()?;
        session.flush()?;

        let rows = session.fetch_rows(descriptor, &criteria.select_window(0, 2))?;
        if rows.len() > 1 {
            return Err(RepoError::MultipleResults {
                entity: descriptor.name,
            });
        }
        Ok(hydrate::<T>(&mut session, rows)?.pop())
    }

    fn count(&self, filters: Option<&FilterSet>) -> RepoResult<u64> {
        let descriptor = T::descriptor();
        let criteria = Criteria::build(descriptor, filters, None)?;
        let mut session = self.session()?;
        session.flush()?;
        session.fetch_count(&criteria.count())
    }

    fn list_all(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
    ) -> RepoResult<Vec<T>> {
        let descriptor = T::descriptor();
        let criteria = Criteria::build(descriptor, filters, order)?;
        let mut session = self.session()?;
        session.flush()?;

        let rows = session.fetch_rows(descriptor, &criteria.select())?;
        hydrate(&mut session, rows)
    }

    fn list_page(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>> {
        let descriptor = T::descriptor();
        let criteria = Criteria::build(descriptor, filters, order)?;
        let mut session = self.session()?;
        session.flush()?;

        let total = session.fetch_count(&criteria.count())?;
        let rows = session.fetch_rows(
            descriptor,
            &criteria.select_window(page.offset(), page.limit()),
        )?;
        let items = hydrate(&mut session, rows)?;

        debug!(
            "event=entity_page module=repo status=ok entity={} page={} size={} items={} total={}",
            descriptor.name,
            page.page_number(),
            page.page_size(),
            items.len(),
            total
        );
        Ok(PagedResult::new(items, page, total))
    }
}

/// Identity-map view of one row: the version the store holds and the version
/// the session will hold after queued writes land.
struct RowState {
    stored: Option<i64>,
    current: Option<i64>,
}

impl RowState {
    fn versioned_current(&self, descriptor: &EntityDescriptor, id: &FieldValue) -> RepoResult<i64> {
        self.current.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "{} {id} has no stored version",
                descriptor.name
            ))
        })
    }
}

/// Resolves whether `key` exists from the session's point of view.
///
/// A queued delete counts as absent; a queued update carries its pending
/// version.
fn row_state(
    session: &Session,
    descriptor: &EntityDescriptor,
    key: &EntityKey,
    id: &FieldValue,
) -> RepoResult<RowState> {
    let not_found = || RepoError::NotFound {
        entity: descriptor.name,
        id: id.to_string(),
    };
    if let Some(write) = session.pending_for(key) {
        return match write.kind {
            WriteKind::Delete => Err(not_found()),
            WriteKind::Update => Ok(RowState {
                stored: write.stored_version,
                current: write.next_version,
            }),
        };
    }
    match session.probe(&probe_statement(descriptor, id.clone()))? {
        Probe::Missing => Err(not_found()),
        Probe::Present { version } => Ok(RowState {
            stored: version,
            current: version,
        }),
    }
}

fn check_version(
    descriptor: &EntityDescriptor,
    id: &FieldValue,
    expected: Option<i64>,
    found: Option<i64>,
) -> RepoResult<()> {
    if expected == found {
        return Ok(());
    }
    Err(RepoError::Concurrency {
        entity: descriptor.name,
        id: id.to_string(),
        expected,
        found,
    })
}

fn require_id<T: Entity>(entity: &T) -> RepoResult<FieldValue> {
    entity
        .id()
        .map(Into::into)
        .ok_or(RepoError::TransientEntity {
            entity: T::descriptor().name,
        })
}

fn key_of<T: Entity>(entity: &T) -> RepoResult<EntityKey> {
    let id = require_id(entity)?;
    Ok(EntityKey::new(T::descriptor(), &id))
}

fn display_id(value: Option<&FieldValue>) -> String {
    value.map_or_else(|| "none".to_string(), ToString::to_string)
}

fn load_row(
    session: &Session,
    descriptor: &'static EntityDescriptor,
    id: &FieldValue,
) -> RepoResult<Option<EntityRow>> {
    let filters = FilterSet::new().with(descriptor.id_column, id.clone());
    let statement = Criteria::build(descriptor, Some(&filters), None)?.select();
    Ok(session.fetch_rows(descriptor, &statement)?.into_iter().next())
}

/// Builds entities from loaded rows and registers each row in the identity map.
fn hydrate<T: Entity>(session: &mut Session, rows: Vec<EntityRow>) -> RepoResult<Vec<T>> {
    let descriptor = T::descriptor();
    let mut entities = Vec::with_capacity(rows.len());
    for row in rows {
        let entity = T::from_row(&row)?;
        if let Some(id) = row.value(descriptor.id_column) {
            let key = EntityKey::new(descriptor, id);
            session.track(key, row);
        }
        entities.push(entity);
    }
    Ok(entities)
}

fn ensure_table_ready(conn: &Connection, descriptor: &EntityDescriptor) -> RepoResult<()> {
    if !table_exists(conn, descriptor.table)? {
        return Err(RepoError::MissingRequiredTable(descriptor.table));
    }
    let existing = table_columns(conn, descriptor.table)?;
    for column in descriptor.select_columns() {
        if !existing.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: descriptor.table,
                column,
            });
        }
    }
    Ok(())
}
