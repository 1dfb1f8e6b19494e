//! Repository error contract.
//!
//! # Responsibility
//! - Name every failure a repository call can surface.
//! - Classify raw SQLite failures into semantic kinds.
//!
//! # Invariants
//! - No error is retried or recovered locally; callers see store failures
//!   unchanged apart from classification.

use crate::db::DbError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Transport or bootstrap failure that has no semantic classification.
    Db(DbError),
    /// Identity absent where a row is mandatory.
    NotFound { entity: &'static str, id: String },
    /// A unique-result lookup matched more than one row.
    MultipleResults { entity: &'static str },
    /// Optimistic version check failed.
    Concurrency {
        entity: &'static str,
        id: String,
        expected: Option<i64>,
        found: Option<i64>,
    },
    /// Constraint or storage failure on write.
    Persistence(String),
    /// Store lock could not be acquired within the busy timeout.
    LockTimeout(String),
    /// Filter or order names a property the entity does not declare.
    InvalidFilterProperty {
        entity: &'static str,
        property: String,
    },
    InvalidPageRequest { page_number: u32, page_size: u32 },
    /// Operation requires an identity the entity does not carry yet.
    TransientEntity { entity: &'static str },
    InvalidDescriptor(String),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// The context session is already borrowed by another operation.
    SessionBusy,
    InvalidState(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::MultipleResults { entity } => {
                write!(f, "more than one {entity} matched a unique lookup")
            }
            Self::Concurrency {
                entity,
                id,
                expected,
                found,
            } => {
                write!(f, "{entity} {id} was modified concurrently")?;
                if let Some(expected) = expected {
                    write!(f, " (expected version {expected}")?;
                    match found {
                        Some(found) => write!(f, ", found {found})")?,
                        None => write!(f, ")")?,
                    }
                }
                Ok(())
            }
            Self::Persistence(message) => write!(f, "persistence failure: {message}"),
            Self::LockTimeout(message) => write!(f, "lock not acquired: {message}"),
            Self::InvalidFilterProperty { entity, property } => {
                write!(f, "unknown property `{property}` on {entity}")
            }
            Self::InvalidPageRequest {
                page_number,
                page_size,
            } => write!(
                f,
                "invalid page request: page {page_number} of size {page_size}; both must be >= 1"
            ),
            Self::TransientEntity { entity } => {
                write!(f, "{entity} has no identity assigned")
            }
            Self::InvalidDescriptor(message) => write!(f, "invalid entity descriptor: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
            Self::SessionBusy => write!(f, "session is already in use by another operation"),
            Self::InvalidState(details) => write!(f, "invalid session state: {details}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Persistence(value.to_string()),
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::LockTimeout(value.to_string())
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}
