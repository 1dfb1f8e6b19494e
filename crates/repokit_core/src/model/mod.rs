//! Entity capability and value model.
//!
//! # Responsibility
//! - Define how caller types describe their storage shape.
//! - Carry typed column values between entities and the store.
//!
//! # Invariants
//! - Entities are identified by their descriptor table plus identity value.

pub mod entity;
pub mod value;
