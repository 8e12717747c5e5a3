//! Command dispatch and reconciliation.
//!
//! # Responsibility
//! - Turn create/update/delete intents into optimistic state plus one remote
//!   call each.
//! - Reconcile confirmed results into the record store, roll back failures.
//!
//! # Invariants
//! - Validation and existence checks happen before any mutation.
//! - The newest command for an id owns its overlay (last writer wins).
//! - Failures are surfaced once and never retried.

pub mod command;
pub mod dispatcher;

pub use command::{CommandError, CommandId, CommandOutcome};
pub use dispatcher::{CommandDispatcher, PendingCommand, VisibleSnapshot};
