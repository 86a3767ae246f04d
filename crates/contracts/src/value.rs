//! Backend-neutral field values used by query filters

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A typed value compared against an entity column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// JSON form matching how serde serializes the same Rust value
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::Timestamp(t) => {
                Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    /// Compare a stored JSON column value against this value.
    ///
    /// Returns `None` when the two are not comparable (type mismatch or null).
    pub fn compare_json(&self, stored: &Value) -> Option<Ordering> {
        match (self, stored) {
            (FieldValue::Null, _) | (_, Value::Null) => None,
            (FieldValue::Bool(b), Value::Bool(s)) => Some(s.cmp(b)),
            (FieldValue::Int(i), Value::Number(n)) => match n.as_i64() {
                Some(s) => Some(s.cmp(i)),
                None => n.as_f64().and_then(|s| s.partial_cmp(&(*i as f64))),
            },
            (FieldValue::Float(f), Value::Number(n)) => n.as_f64().and_then(|s| s.partial_cmp(f)),
            (FieldValue::Text(t), Value::String(s)) => Some(s.as_str().cmp(t.as_str())),
            (FieldValue::Uuid(u), Value::String(s)) => {
                Uuid::parse_str(s).ok().map(|parsed| parsed.cmp(u))
            }
            (FieldValue::Timestamp(t), Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc).cmp(t)),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}
