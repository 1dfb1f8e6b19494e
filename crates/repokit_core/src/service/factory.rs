//! Service resolution bound to operation contexts.
//!
//! # Responsibility
//! - Build persistence services that borrow a caller-owned context.
//! - Build stateless services that own a freshly opened context.
//!
//! # Invariants
//! - A bound service never outlives its context.
//! - A stateless service never shares its context with another service.

use crate::config::StoreConfig;
use crate::db::migrations::Migration;
use crate::repo::error::RepoResult;
use crate::session::context::OperationContext;
use log::debug;
use std::any::type_name;

/// Service that works inside a caller's operation context.
pub trait PersistenceService<'ctx>: Sized {
    fn bind(context: &'ctx OperationContext) -> RepoResult<Self>;
}

/// Service that owns its own context for its whole lifetime.
pub trait StatelessService: Sized {
    fn bind_owned(context: OperationContext) -> RepoResult<Self>;
}

/// Resolves typed services against one store configuration.
#[derive(Debug, Clone)]
pub struct ServiceFactory {
    config: StoreConfig,
    migrations: &'static [Migration],
}

impl ServiceFactory {
    pub fn new(config: StoreConfig, migrations: &'static [Migration]) -> Self {
        Self { config, migrations }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Opens a new session from the factory configuration.
    ///
    /// With an in-memory location every context sees its own empty store.
    pub fn open_context(&self) -> RepoResult<OperationContext> {
        OperationContext::open(&self.config, self.migrations)
    }

    /// Returns a service bound to `context`.
    pub fn get<'ctx, S: PersistenceService<'ctx>>(
        context: &'ctx OperationContext,
    ) -> RepoResult<S> {
        let service = S::bind(context)?;
        debug!(
            "event=service_resolve module=service status=ok service={} scope=context",
            type_name::<S>()
        );
        Ok(service)
    }

    /// Returns a service owning a freshly opened context.
    pub fn get_stateless<S: StatelessService>(&self) -> RepoResult<S> {
        let context = self.open_context()?;
        let service = S::bind_owned(context)?;
        debug!(
            "event=service_resolve module=service status=ok service={} scope=owned store={}",
            type_name::<S>(),
            self.config.mode()
        );
        Ok(service)
    }
}
