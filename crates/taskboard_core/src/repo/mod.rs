//! Persistence layer of the local reference server.
//!
//! # Responsibility
//! - Define collection-scoped record storage contracts.
//! - Keep SQL details out of the server's request handling.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) next to DB errors.
//! - Reads reject corrupt persisted rows instead of masking them.

pub mod record_repo;
