//! Per-operation context owning one session.
//!
//! # Responsibility
//! - Hand out exclusive session borrows to repositories.
//! - Own transaction boundaries for the operation.
//!
//! # Invariants
//! - At most one borrow is live at a time; a second concurrent borrow is
//!   `SessionBusy`, never a panic.
//! - Contexts are `!Sync`; one context serves one logical operation.

use crate::config::StoreConfig;
use crate::db::migrations::Migration;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::handle::{Session, TransactionMode};
use log::warn;
use std::cell::{RefCell, RefMut};

/// Source of the current session for repositories.
pub trait SessionProvider {
    /// Borrows the session for the duration of one repository call.
    fn session(&self) -> RepoResult<RefMut<'_, Session>>;
}

#[derive(Debug)]
pub struct OperationContext {
    session: RefCell<Session>,
}

impl OperationContext {
    pub fn new(session: Session) -> Self {
        Self {
            session: RefCell::new(session),
        }
    }

    pub fn open(config: &StoreConfig, migrations: &[Migration]) -> RepoResult<Self> {
        Ok(Self::new(Session::open(config, migrations)?))
    }

    pub fn begin(&self, mode: TransactionMode) -> RepoResult<()> {
        self.session()?.begin(mode)
    }

    pub fn commit(&self) -> RepoResult<()> {
        self.session()?.commit()
    }

    pub fn rollback(&self) -> RepoResult<()> {
        self.session()?.rollback()
    }

    pub fn flush(&self) -> RepoResult<usize> {
        self.session()?.flush()
    }

    /// Runs `work` inside a transaction: commits on success, rolls back when
    /// `work` or the commit fails.
    pub fn with_transaction<R>(
        &self,
        mode: TransactionMode,
        work: impl FnOnce(&Self) -> RepoResult<R>,
    ) -> RepoResult<R> {
        self.begin(mode)?;
        let outcome = work(self).and_then(|value| self.commit().map(|()| value));
        if let Err(err) = &outcome {
            if let Err(rollback_err) = self.rollback() {
                warn!(
                    "event=tx_rollback module=session status=error cause={} error={}",
                    err, rollback_err
                );
            }
        }
        outcome
    }

    pub fn into_session(self) -> Session {
        self.session.into_inner()
    }
}

impl SessionProvider for OperationContext {
    fn session(&self) -> RepoResult<RefMut<'_, Session>> {
        self.session
            .try_borrow_mut()
            .map_err(|_| RepoError::SessionBusy)
    }
}
