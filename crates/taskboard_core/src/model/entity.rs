//! Generic entity record shared by every synchronized collection.
//!
//! # Responsibility
//! - Define the canonical record shape returned by the remote side.
//! - Provide field-map merge helpers used by overlays and the server.
//!
//! # Invariants
//! - `id` is assigned by the server and never changes afterwards.
//! - `updated_at >= created_at` for every canonical value.
//! - A `FieldValue::Null` inside a patch removes the field on merge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Server-assigned stable identifier.
pub type EntityId = u64;

/// Named attributes of one entity, ordered by field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Scalar value stored in one entity field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent value. In patches this clears the field.
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Returns the text payload for `Text` values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds a field map from `(name, value)` pairs.
pub fn field_map<I, K, V>(pairs: I) -> FieldMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// Returns `base` with `patch` applied on top.
///
/// `Null` entries in `patch` remove the field from the result.
pub fn merge_fields(base: &FieldMap, patch: &FieldMap) -> FieldMap {
    let mut merged = base.clone();
    for (name, value) in patch {
        if value.is_null() {
            merged.remove(name);
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Folds a newer patch onto an older unconfirmed one.
///
/// Unlike [`merge_fields`], `Null` markers are kept so the folded patch still
/// clears those fields when it is finally merged onto committed state.
pub fn fold_patch(older: &FieldMap, newer: &FieldMap) -> FieldMap {
    let mut folded = older.clone();
    folded.extend(newer.iter().map(|(k, v)| (k.clone(), v.clone())));
    folded
}

/// Canonical, server-confirmed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub fields: FieldMap,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds, set by the server on every mutation.
    pub updated_at: i64,
}

impl Entity {
    pub fn new(id: EntityId, fields: FieldMap, created_at: i64, updated_at: i64) -> Self {
        Self {
            id,
            fields,
            created_at,
            updated_at,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }

    /// Returns this entity's fields with `patch` applied.
    pub fn patched_fields(&self, patch: &FieldMap) -> FieldMap {
        merge_fields(&self.fields, patch)
    }
}
