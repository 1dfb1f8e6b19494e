//! Repository layer abstractions and the SQLite implementation.
//!
//! # Responsibility
//! - Define the generic data access contract for entity types.
//! - Isolate SQL details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Concurrency`,
//!   `MultipleResults`) in addition to store transport errors.

pub mod error;
pub mod repository;
