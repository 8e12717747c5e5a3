//! Domain model for synchronized collections.
//!
//! # Responsibility
//! - Define the generic `Entity` record every collection stores.
//! - Provide typed projections (`Task`, `About`) over generic entities.
//!
//! # Invariants
//! - Every record is identified by a server-assigned `EntityId`.
//! - Projections never mutate the entity they are read from.

pub mod about;
pub mod entity;
pub mod task;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error raised when a generic entity does not fit a typed projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    MissingField(&'static str),
    InvalidValue { field: &'static str, value: String },
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value `{value}` for field `{field}`")
            }
        }
    }
}

impl Error for ProjectionError {}
