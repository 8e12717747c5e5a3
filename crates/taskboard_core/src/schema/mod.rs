//! Per-collection field schemas.
//!
//! # Responsibility
//! - Describe field rules (kind, required-ness, length bounds, enumerated
//!   domain, pattern, default) supplied as configuration.
//! - Validate create inputs and update patches before any mutation.
//!
//! # Invariants
//! - Rule patterns are compiled once when the schema is built.
//! - Defaults always satisfy their own rule.

pub mod builtin;
mod validation;

pub use validation::{FieldViolation, ValidationError};

use crate::model::entity::FieldValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declared value type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Bool,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Bool => "bool",
        }
    }

    fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::Text, FieldValue::Text(_))
                | (Self::Integer, FieldValue::Integer(_))
                | (Self::Bool, FieldValue::Bool(_))
        )
    }
}

/// Validation rule for one named field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    /// Enumerated domain, compared against the value's string form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Value filled in on create when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            min_len: None,
            max_len: None,
            one_of: None,
            pattern: None,
            default: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = Some(min_len);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Human-readable field label used in violation messages.
    fn label(&self) -> String {
        let spaced = self.name.replace('_', " ");
        let mut chars = spaced.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Schema construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    EmptyCollection,
    DuplicateField {
        collection: String,
        field: String,
    },
    InvalidRule {
        collection: String,
        field: String,
        reason: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCollection => write!(f, "collection name cannot be empty"),
            Self::DuplicateField { collection, field } => {
                write!(f, "duplicate field `{field}` in collection `{collection}`")
            }
            Self::InvalidRule {
                collection,
                field,
                reason,
            } => write!(
                f,
                "invalid rule for `{collection}.{field}`: {reason}"
            ),
        }
    }
}

impl Error for SchemaError {}

/// Validated field schema of one collection.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    collection: String,
    resource_key: String,
    rules: Vec<FieldRule>,
    patterns: HashMap<String, Regex>,
}

impl EntitySchema {
    /// Builds a schema, checking every rule for internal consistency.
    ///
    /// # Errors
    /// - `EmptyCollection` for a blank collection name.
    /// - `DuplicateField` when two rules share a name.
    /// - `InvalidRule` for inverted length bounds, a bad pattern, or a
    ///   default that violates its own rule.
    pub fn new(
        collection: impl Into<String>,
        resource_key: impl Into<String>,
        rules: Vec<FieldRule>,
    ) -> Result<Self, SchemaError> {
        let collection = collection.into().trim().to_string();
        if collection.is_empty() {
            return Err(SchemaError::EmptyCollection);
        }
        let resource_key = resource_key.into().trim().to_string();

        let mut seen = HashSet::new();
        let mut patterns = HashMap::new();
        for rule in &rules {
            if !seen.insert(rule.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    collection,
                    field: rule.name.clone(),
                });
            }
            let invalid = |reason: String| SchemaError::InvalidRule {
                collection: collection.clone(),
                field: rule.name.clone(),
                reason,
            };

            if let (Some(min), Some(max)) = (rule.min_len, rule.max_len) {
                if min > max {
                    return Err(invalid(format!("min_len {min} exceeds max_len {max}")));
                }
            }
            if rule.kind != FieldKind::Text && (rule.min_len.is_some() || rule.max_len.is_some())
            {
                return Err(invalid("length bounds require kind `text`".to_string()));
            }
            if let Some(pattern) = rule.pattern.as_deref() {
                let compiled = Regex::new(pattern)
                    .map_err(|err| invalid(format!("invalid pattern: {err}")))?;
                patterns.insert(rule.name.clone(), compiled);
            }
        }

        let schema = Self {
            collection,
            resource_key,
            rules,
            patterns,
        };

        for rule in &schema.rules {
            if let Some(default) = rule.default.as_ref() {
                if let Some(reason) = schema.check_value(rule, default) {
                    return Err(SchemaError::InvalidRule {
                        collection: schema.collection.clone(),
                        field: rule.name.clone(),
                        reason: format!("default rejected: {reason}"),
                    });
                }
            }
        }

        Ok(schema)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Key wrapping the field map in remote request bodies.
    ///
    /// Falls back to the collection name when unset.
    pub fn resource_key(&self) -> &str {
        if self.resource_key.is_empty() {
            &self.collection
        } else {
            &self.resource_key
        }
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }
}

/// Lookup table of schemas by collection name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one schema; a later schema for the same collection replaces
    /// the earlier one.
    pub fn insert(&mut self, schema: EntitySchema) {
        self.schemas.insert(schema.collection().to_string(), schema);
    }

    pub fn get(&self, collection: &str) -> Option<&EntitySchema> {
        self.schemas.get(collection)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
