//! Core use-case services.
//!
//! # Responsibility
//! - Wrap repositories into use-case level APIs.
//! - Resolve services against caller-owned or freshly opened contexts.

pub mod entity_service;
pub mod factory;
