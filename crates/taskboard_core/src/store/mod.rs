//! Client-side state: confirmed records plus optimistic overlays.
//!
//! # Responsibility
//! - Keep the last confirmed server state (`RecordStore`).
//! - Keep unconfirmed per-entity state (`OptimisticOverlay`).
//! - Describe what the UI renders (`VisibleEntity`).
//!
//! # Invariants
//! - Both structures are mutated only by the command dispatcher.

pub mod overlay;
pub mod record_store;

use crate::model::entity::{Entity, EntityId, FieldMap, FieldValue};
use crate::sync::command::CommandId;

/// Identity of one visible row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibleKey {
    /// Entity known to the server.
    Committed(EntityId),
    /// Create still in flight; keyed by its command.
    Provisional(CommandId),
}

/// One row of the visible sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleEntity {
    pub key: VisibleKey,
    pub fields: FieldMap,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    /// `true` while an unconfirmed command shapes this row.
    pub pending: bool,
}

impl VisibleEntity {
    pub(crate) fn committed(entity: &Entity) -> Self {
        Self {
            key: VisibleKey::Committed(entity.id),
            fields: entity.fields.clone(),
            created_at: Some(entity.created_at),
            updated_at: Some(entity.updated_at),
            pending: false,
        }
    }

    /// Server id, `None` for provisional rows.
    pub fn id(&self) -> Option<EntityId> {
        match self.key {
            VisibleKey::Committed(id) => Some(id),
            VisibleKey::Provisional(_) => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }
}
