//! JSON wire format for entities and HTTP response normalization.
//!
//! Entities travel as flat JSON objects:
//! `{"id": 42, "title": "...", "created_at": ..., "updated_at": ...}`.
//! Timestamps are accepted as epoch milliseconds or RFC 3339 strings.

use super::{Operation, RemoteErrorKind, RemoteOutcome};
use crate::model::entity::{Entity, EntityId, FieldMap, FieldValue};
use chrono::DateTime;
use serde_json::{Map, Value};

const RESERVED_KEYS: [&str; 3] = ["id", "created_at", "updated_at"];
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Decodes one entity object.
pub fn entity_from_json(value: &Value) -> Result<Entity, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected entity object, got {}", json_kind(value)))?;

    let id = object
        .get("id")
        .and_then(Value::as_u64)
        .ok_or("entity is missing a non-negative integer `id`")?;
    let created_at = parse_timestamp(object.get("created_at"), "created_at")?;
    let updated_at = parse_timestamp(object.get("updated_at"), "updated_at")?;

    let mut fields = FieldMap::new();
    for (name, raw) in object {
        if RESERVED_KEYS.contains(&name.as_str()) {
            continue;
        }
        fields.insert(name.clone(), field_value_from_json(name, raw)?);
    }

    Ok(Entity::new(id, fields, created_at, updated_at))
}

pub fn entity_to_json(entity: &Entity) -> Value {
    let mut object = fields_to_object(&entity.fields);
    object.insert("id".to_string(), Value::from(entity.id));
    object.insert("created_at".to_string(), Value::from(entity.created_at));
    object.insert("updated_at".to_string(), Value::from(entity.updated_at));
    Value::Object(object)
}

pub fn fields_to_json(fields: &FieldMap) -> Value {
    Value::Object(fields_to_object(fields))
}

fn fields_to_object(fields: &FieldMap) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), field_value_to_json(value)))
        .collect()
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(value) => Value::Bool(*value),
        FieldValue::Integer(value) => Value::from(*value),
        FieldValue::Text(value) => Value::String(value.clone()),
    }
}

fn field_value_from_json(name: &str, value: &Value) -> Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(value) => Ok(FieldValue::Bool(*value)),
        Value::String(value) => Ok(FieldValue::Text(value.clone())),
        Value::Number(number) => number
            .as_i64()
            .map(FieldValue::Integer)
            .ok_or_else(|| format!("field `{name}` is not an integer: {number}")),
        other => Err(format!(
            "field `{name}` has unsupported {} value",
            json_kind(other)
        )),
    }
}

/// Parses epoch milliseconds or an RFC 3339 timestamp.
pub fn parse_timestamp(value: Option<&Value>, field: &str) -> Result<i64, String> {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| format!("`{field}` is not an integer timestamp")),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.timestamp_millis())
            .map_err(|err| format!("`{field}` is not RFC 3339 (`{text}`): {err}")),
        Some(other) => Err(format!("`{field}` has unsupported {} value", json_kind(other))),
        None => Err(format!("entity is missing `{field}`")),
    }
}

/// Decodes a list response.
///
/// A single object is accepted as a one-element list; singleton resources
/// answer their index route with the record itself.
pub fn entities_from_body(body: &str) -> Result<Vec<Entity>, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| format!("invalid json body: {err}"))?;
    match &value {
        Value::Array(items) => items.iter().map(entity_from_json).collect(),
        Value::Object(_) => entity_from_json(&value).map(|entity| vec![entity]),
        other => Err(format!("expected entity list, got {}", json_kind(other))),
    }
}

/// Maps an HTTP status and body to a `RemoteOutcome`.
///
/// - 2xx create/update: body must be the canonical entity, with the
///   requested id for updates.
/// - 2xx delete: empty body or `{"success": true}`.
/// - 404 → `NotFound`, 422 → `Rejected`, 408/504 → `Timeout`, other
///   non-2xx → `Status(code)`.
pub fn normalize_response(
    op: Operation,
    id: Option<EntityId>,
    status: u16,
    body: &str,
) -> RemoteOutcome {
    if !(200..300).contains(&status) {
        let kind = match status {
            404 => RemoteErrorKind::NotFound,
            422 => RemoteErrorKind::Rejected,
            408 | 504 => RemoteErrorKind::Timeout,
            other => RemoteErrorKind::Status(other),
        };
        return RemoteOutcome::failed(kind, error_message(status, body));
    }

    match op {
        Operation::Delete => normalize_delete(id, body),
        Operation::Create | Operation::Update => {
            let value: Value = match serde_json::from_str(body) {
                Ok(value) => value,
                Err(err) => {
                    return RemoteOutcome::failed(
                        RemoteErrorKind::Malformed,
                        format!("invalid json body: {err}"),
                    )
                }
            };
            match entity_from_json(&value) {
                Ok(entity) if op == Operation::Update && Some(entity.id) != id => {
                    RemoteOutcome::failed(
                        RemoteErrorKind::Malformed,
                        format!("update for {id:?} answered with entity {}", entity.id),
                    )
                }
                Ok(entity) => RemoteOutcome::entity(entity),
                Err(message) => RemoteOutcome::failed(RemoteErrorKind::Malformed, message),
            }
        }
    }
}

fn normalize_delete(id: Option<EntityId>, body: &str) -> RemoteOutcome {
    let Some(id) = id else {
        return RemoteOutcome::failed(RemoteErrorKind::Malformed, "delete without target id");
    };
    if body.trim().is_empty() {
        return RemoteOutcome::deleted(id);
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("success").and_then(Value::as_bool) {
            Some(false) => RemoteOutcome::failed(
                RemoteErrorKind::Rejected,
                format!("server refused to delete {id}"),
            ),
            _ => RemoteOutcome::deleted(id),
        },
        Err(err) => RemoteOutcome::failed(
            RemoteErrorKind::Malformed,
            format!("invalid json body: {err}"),
        ),
    }
}

fn error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").or_else(|| value.get("errors")).cloned())
        .map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string());
    let truncated: String = detail.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if truncated.is_empty() {
        format!("http status {status}")
    } else {
        format!("http status {status}: {truncated}")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
