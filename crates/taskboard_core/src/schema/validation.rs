//! Create/patch validation against an `EntitySchema`.

use super::{EntitySchema, FieldKind, FieldRule};
use crate::model::entity::{FieldMap, FieldValue};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One offending field and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

/// Input fields failed schema constraints.
///
/// Raised before any optimistic mutation or remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub collection: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Returns offending field names in report order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.field.as_str())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields().any(|name| name == field)
    }

    /// Returns the first reason reported for `field`.
    pub fn reason(&self, field: &str) -> Option<&str> {
        self.violations
            .iter()
            .find(|v| v.field == field)
            .map(|v| v.reason.as_str())
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed for `{}`: ", self.collection)?;
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", violation.field, violation.reason)?;
        }
        Ok(())
    }
}

impl Error for ValidationError {}

impl EntitySchema {
    /// Validates a full create input.
    ///
    /// Returns the normalized field map: defaults filled in for absent
    /// fields, `Null` entries for optional fields dropped.
    ///
    /// # Errors
    /// Returns every violation found, not only the first one.
    pub fn validate_create(&self, fields: &FieldMap) -> Result<FieldMap, ValidationError> {
        let mut normalized = FieldMap::new();
        let mut violations = Vec::new();

        for rule in &self.rules {
            match fields.get(&rule.name).filter(|value| !value.is_null()) {
                Some(value) => match self.check_value(rule, value) {
                    Some(reason) => violations.push(violation(rule, reason)),
                    None => {
                        normalized.insert(rule.name.clone(), value.clone());
                    }
                },
                None => {
                    if let Some(default) = rule.default.as_ref() {
                        normalized.insert(rule.name.clone(), default.clone());
                    } else if rule.required {
                        violations.push(violation(rule, format!("{} is required", rule.label())));
                    }
                }
            }
        }
        violations.extend(self.unknown_fields(fields));

        self.finish(violations).map(|()| normalized)
    }

    /// Validates a partial update. Only present fields are checked.
    ///
    /// A `Null` value clears the field and is rejected for required fields.
    pub fn validate_patch(&self, patch: &FieldMap) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        for rule in &self.rules {
            let Some(value) = patch.get(&rule.name) else {
                continue;
            };
            if value.is_null() {
                if rule.required {
                    violations.push(violation(rule, format!("{} is required", rule.label())));
                }
                continue;
            }
            if let Some(reason) = self.check_value(rule, value) {
                violations.push(violation(rule, reason));
            }
        }
        violations.extend(self.unknown_fields(patch));

        self.finish(violations)
    }

    /// Checks one non-null value against its rule.
    ///
    /// Returns the violation reason, or `None` when the value passes.
    pub(super) fn check_value(&self, rule: &FieldRule, value: &FieldValue) -> Option<String> {
        let label = rule.label();
        if !rule.kind.accepts(value) {
            return Some(format!("{label} must be of type {}", rule.kind.as_str()));
        }

        if let FieldValue::Text(text) = value {
            if rule.required && text.trim().is_empty() {
                return Some(format!("{label} is required"));
            }
            let length = text.chars().count();
            if let Some(min) = rule.min_len {
                if length < min {
                    return Some(format!("{label} must be at least {min} characters"));
                }
            }
            if let Some(max) = rule.max_len {
                if length > max {
                    return Some(format!("{label} must be less than {max} characters"));
                }
            }
            if let Some(pattern) = self.patterns.get(&rule.name) {
                if !pattern.is_match(text) {
                    return Some(format!("{label} has an invalid format"));
                }
            }
        }

        if let Some(domain) = rule.one_of.as_ref() {
            let rendered = value.to_string();
            if !domain.iter().any(|allowed| *allowed == rendered) {
                return Some(format!("{label} must be one of: {}", domain.join(", ")));
            }
        }

        None
    }

    fn unknown_fields<'a>(
        &'a self,
        fields: &'a FieldMap,
    ) -> impl Iterator<Item = FieldViolation> + 'a {
        fields
            .keys()
            .filter(|name| self.rule(name).is_none())
            .map(|name| FieldViolation {
                field: name.clone(),
                reason: format!("unknown field for collection `{}`", self.collection),
            })
    }

    fn finish(&self, violations: Vec<FieldViolation>) -> Result<(), ValidationError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                collection: self.collection.clone(),
                violations,
            })
        }
    }
}

fn violation(rule: &FieldRule, reason: String) -> FieldViolation {
    FieldViolation {
        field: rule.name.clone(),
        reason,
    }
}
