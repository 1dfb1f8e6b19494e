//! Generic entity use-case services.
//!
//! # Responsibility
//! - Offer stable CRUD/listing entry points for any entity type.
//! - Delegate persistence to `Repository` implementations.
//!
//! # Invariants
//! - Services never bypass repository contracts.
//! - `StatelessEntityService` flushes after every write so no queued write
//!   outlives the call that produced it.

use crate::model::entity::Entity;
use crate::model::value::FieldValue;
use crate::query::filter::{FilterSet, OrderSpec};
use crate::query::page::{PageRequest, PagedResult};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::repository::{Repository, SqliteRepository};
use crate::service::factory::{PersistenceService, StatelessService};
use crate::session::context::OperationContext;
use crate::session::handle::TransactionMode;
use std::marker::PhantomData;

/// Use-case wrapper over one entity repository.
pub struct EntityService<T: Entity, R: Repository<T>> {
    repo: R,
    _entity: PhantomData<fn() -> T>,
}

/// Entity service over the SQLite repository of a caller context.
pub type SqliteEntityService<'ctx, T> = EntityService<T, SqliteRepository<'ctx, T>>;

impl<T: Entity, R: Repository<T>> EntityService<T, R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            _entity: PhantomData,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn create(&self, entity: &mut T) -> RepoResult<()> {
        self.repo.save(entity)
    }

    /// Inserts or updates depending on whether the identity exists.
    pub fn store(&self, entity: &mut T) -> RepoResult<()> {
        self.repo.save_or_update(entity)
    }

    pub fn modify(&self, entity: &mut T) -> RepoResult<()> {
        self.repo.update(entity)
    }

    pub fn remove(&self, entity: &T) -> RepoResult<()> {
        self.repo.delete(entity)
    }

    pub fn find(&self, id: &T::Id) -> RepoResult<Option<T>> {
        self.repo.get(id)
    }

    /// Like `find`, but an absent identity is `NotFound`.
    pub fn require(&self, id: &T::Id) -> RepoResult<T> {
        self.repo.get(id)?.ok_or_else(|| {
            let id: FieldValue = id.clone().into();
            RepoError::NotFound {
                entity: T::descriptor().name,
                id: id.to_string(),
            }
        })
    }

    pub fn exists(&self, id: &T::Id) -> RepoResult<bool> {
        self.repo.verify_id(id)
    }

    pub fn count(&self, filters: Option<&FilterSet>) -> RepoResult<u64> {
        self.repo.count(filters)
    }

    pub fn list(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
    ) -> RepoResult<Vec<T>> {
        self.repo.list_all(filters, order)
    }

    pub fn page(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>> {
        self.repo.list_page(filters, order, page)
    }
}

impl<'ctx, T: Entity> PersistenceService<'ctx> for SqliteEntityService<'ctx, T> {
    fn bind(context: &'ctx OperationContext) -> RepoResult<Self> {
        Ok(Self::new(SqliteRepository::try_new(context)?))
    }
}

/// Entity service owning its context; every write is flushed before return.
pub struct StatelessEntityService<T: Entity> {
    context: OperationContext,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> StatelessEntityService<T> {
    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn into_context(self) -> OperationContext {
        self.context
    }

    pub fn create(&self, entity: &mut T) -> RepoResult<()> {
        self.repository().save(entity)
    }

    pub fn store(&self, entity: &mut T) -> RepoResult<()> {
        self.repository().save_or_update(entity)?;
        self.context.flush().map(|_| ())
    }

    pub fn modify(&self, entity: &mut T) -> RepoResult<()> {
        self.repository().update(entity)?;
        self.context.flush().map(|_| ())
    }

    pub fn remove(&self, entity: &T) -> RepoResult<()> {
        self.repository().delete(entity)?;
        self.context.flush().map(|_| ())
    }

    pub fn find(&self, id: &T::Id) -> RepoResult<Option<T>> {
        self.repository().get(id)
    }

    pub fn count(&self, filters: Option<&FilterSet>) -> RepoResult<u64> {
        self.repository().count(filters)
    }

    pub fn list(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
    ) -> RepoResult<Vec<T>> {
        self.repository().list_all(filters, order)
    }

    pub fn page(
        &self,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
        page: PageRequest,
    ) -> RepoResult<PagedResult<T>> {
        self.repository().list_page(filters, order, page)
    }

    /// Runs `work` against the owned repository inside one transaction.
    pub fn with_transaction<V>(
        &self,
        mode: TransactionMode,
        work: impl FnOnce(&SqliteRepository<'_, T>) -> RepoResult<V>,
    ) -> RepoResult<V> {
        let repo = self.repository();
        self.context.with_transaction(mode, |_| work(&repo))
    }

    fn repository(&self) -> SqliteRepository<'_, T> {
        SqliteRepository::verified(&self.context)
    }
}

impl<T: Entity> StatelessService for StatelessEntityService<T> {
    fn bind_owned(context: OperationContext) -> RepoResult<Self> {
        SqliteRepository::<T>::try_new(&context)?;
        Ok(Self {
            context,
            _entity: PhantomData,
        })
    }
}
