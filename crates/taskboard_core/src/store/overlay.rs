//! Transient optimistic state layered over the record store.
//!
//! # Responsibility
//! - Hold at most one unconfirmed overlay per entity id.
//! - Hold provisional creates that have no server id yet.
//! - Compute the visible sequence (store + overlays).
//!
//! # Invariants
//! - Every overlay entry is owned by exactly one in-flight command.
//! - A newer entry for the same id replaces the older one.
//! - The overlay never mutates the record store.

use crate::model::entity::{fold_patch, merge_fields, EntityId, FieldMap};
use crate::store::record_store::RecordStore;
use crate::store::{VisibleEntity, VisibleKey};
use crate::sync::command::CommandId;
use std::collections::{BTreeMap, HashMap};

/// Unconfirmed state for one committed entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEntry {
    /// Pending update; `patch` holds every unconfirmed field change.
    Patch { command: CommandId, patch: FieldMap },
    /// Pending delete; the entity is hidden from the visible sequence.
    Suppressed { command: CommandId },
}

impl OverlayEntry {
    pub fn command(&self) -> CommandId {
        match self {
            Self::Patch { command, .. } | Self::Suppressed { command } => *command,
        }
    }
}

/// Result of [`OptimisticOverlay::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Command whose overlay was replaced, if any.
    pub superseded: Option<CommandId>,
    /// Effective patch now shown for the id.
    pub patch: FieldMap,
}

#[derive(Debug, Clone, Default)]
pub struct OptimisticOverlay {
    entries: HashMap<EntityId, OverlayEntry>,
    provisional: BTreeMap<CommandId, FieldMap>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows `patch` on top of the current visible value of `id`.
    ///
    /// An earlier pending patch is folded in and its command superseded; an
    /// earlier suppression is replaced, making the entity visible again.
    pub fn apply(&mut self, id: EntityId, command: CommandId, patch: &FieldMap) -> Applied {
        let (superseded, effective) = match self.entries.remove(&id) {
            Some(OverlayEntry::Patch {
                command: previous,
                patch: pending,
            }) => (Some(previous), fold_patch(&pending, patch)),
            Some(OverlayEntry::Suppressed { command: previous }) => (Some(previous), patch.clone()),
            None => (None, patch.clone()),
        };
        self.entries.insert(
            id,
            OverlayEntry::Patch {
                command,
                patch: effective.clone(),
            },
        );
        Applied {
            superseded,
            patch: effective,
        }
    }

    /// Hides `id` until its deletion resolves.
    ///
    /// Returns the superseded command, if any.
    pub fn suppress(&mut self, id: EntityId, command: CommandId) -> Option<CommandId> {
        self.entries
            .insert(id, OverlayEntry::Suppressed { command })
            .map(|previous| previous.command())
    }

    /// Drops the overlay for `id`, reverting to the store value.
    pub fn clear(&mut self, id: EntityId) -> Option<OverlayEntry> {
        self.entries.remove(&id)
    }

    /// Drops the overlay for `id` only while `command` still owns it.
    pub fn clear_owned(&mut self, id: EntityId, command: CommandId) -> bool {
        if self.owner(id) == Some(command) {
            self.entries.remove(&id);
            true
        } else {
            false
        }
    }

    pub fn owner(&self, id: EntityId) -> Option<CommandId> {
        self.entries.get(&id).map(OverlayEntry::command)
    }

    pub fn entry(&self, id: EntityId) -> Option<&OverlayEntry> {
        self.entries.get(&id)
    }

    pub fn add_provisional(&mut self, command: CommandId, fields: FieldMap) {
        self.provisional.insert(command, fields);
    }

    pub fn remove_provisional(&mut self, command: CommandId) -> Option<FieldMap> {
        self.provisional.remove(&command)
    }

    /// Number of active overlays, provisional creates included.
    pub fn len(&self) -> usize {
        self.entries.len() + self.provisional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.provisional.is_empty()
    }

    /// Visible value of one committed entity, `None` when absent or
    /// suppressed.
    pub fn visible_for(&self, id: EntityId, store: &RecordStore) -> Option<VisibleEntity> {
        let entity = store.get(id)?;
        match self.entries.get(&id) {
            Some(OverlayEntry::Suppressed { .. }) => None,
            Some(OverlayEntry::Patch { patch, .. }) => Some(VisibleEntity {
                key: VisibleKey::Committed(id),
                fields: merge_fields(&entity.fields, patch),
                created_at: Some(entity.created_at),
                updated_at: Some(entity.updated_at),
                pending: true,
            }),
            None => Some(VisibleEntity::committed(entity)),
        }
    }

    /// Store order with overlays applied, then provisional creates in issue
    /// order.
    pub fn visible(&self, store: &RecordStore) -> Vec<VisibleEntity> {
        let committed = store
            .iter()
            .filter_map(|entity| self.visible_for(entity.id, store));
        let provisional = self
            .provisional
            .iter()
            .map(|(command, fields)| VisibleEntity {
                key: VisibleKey::Provisional(*command),
                fields: fields.clone(),
                created_at: None,
                updated_at: None,
                pending: true,
            });
        committed.chain(provisional).collect()
    }
}
