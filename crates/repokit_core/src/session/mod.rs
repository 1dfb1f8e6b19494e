//! Session and context management.
//!
//! # Responsibility
//! - Track loaded entities and queued writes per session.
//! - Scope one session to one logical operation through a context.

pub mod context;
pub mod handle;
