//! Store configuration.
//!
//! # Responsibility
//! - Describe where and how a session connection is opened.
//! - Stay embeddable in a host application's serde-based config file.
//!
//! # Invariants
//! - Every field has a default, so partial documents deserialize.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Physical location of the SQLite database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum StoreLocation {
    /// Private database that lives as long as its connection.
    #[default]
    Memory,
    File(PathBuf),
}

/// Connection settings applied when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Short label used in log lines.
    pub fn mode(&self) -> &'static str {
        match self.location {
            StoreLocation::Memory => "memory",
            StoreLocation::File(_) => "file",
        }
    }
}
