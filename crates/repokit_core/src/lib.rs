//! Generic repository layer over SQLite.
//! Entities describe their storage shape; repositories provide CRUD,
//! filtered listing and pagination through a context-scoped session.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod session;

pub use config::{StoreConfig, StoreLocation};
pub use db::migrations::Migration;
pub use db::{open_db, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::entity::{Entity, EntityDescriptor, EntityKey, EntityRow, IdStrategy};
pub use model::value::FieldValue;
pub use query::criteria::{Criteria, Statement};
pub use query::filter::{FilterSet, OrderDirection, OrderSpec};
pub use query::page::{PageRequest, PagedResult};
pub use repo::error::{RepoError, RepoResult};
pub use repo::repository::{Repository, SqliteRepository, INITIAL_VERSION};
pub use service::entity_service::{EntityService, SqliteEntityService, StatelessEntityService};
pub use service::factory::{PersistenceService, ServiceFactory, StatelessService};
pub use session::context::{OperationContext, SessionProvider};
pub use session::handle::{Session, TransactionMode};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
