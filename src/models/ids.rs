//! Identifier types used across the audit trail
//!
//! Tracked records, parent context records and actors can all be keyed by
//! either an integer or a string, so they share `RecordId`. Units of work get
//! a strongly-typed UUID wrapper.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a tracked record, a context record or an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Convert a JSON value into an id
    ///
    /// Integers and strings map directly; `null` yields `None`; anything else
    /// is stored as its compact JSON text.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => Some(Self::Text(n.to_string())),
            },
            Value::String(s) => Some(Self::Text(s.clone())),
            other => Some(Self::Text(other.to_string())),
        }
    }

    /// The id as a JSON value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        Self::Int(id.into())
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    /// Numeric strings become `Int`, everything else `Text`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Text(s.to_string()),
        })
    }
}

/// Identity of one transactional unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Create a new random ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow-{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_from_value() {
        assert_eq!(RecordId::from_value(&json!(42)), Some(RecordId::Int(42)));
        assert_eq!(
            RecordId::from_value(&json!("abc")),
            Some(RecordId::Text("abc".into()))
        );
        assert_eq!(RecordId::from_value(&json!(null)), None);
        assert_eq!(
            RecordId::from_value(&json!({"a": 1})),
            Some(RecordId::Text("{\"a\":1}".into()))
        );
    }

    #[test]
    fn test_record_id_untagged_serialization() {
        assert_eq!(serde_json::to_string(&RecordId::Int(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&RecordId::Text("u-1".into())).unwrap(),
            "\"u-1\""
        );
        let parsed: RecordId = serde_json::from_str("\"u-1\"").unwrap();
        assert_eq!(parsed, RecordId::Text("u-1".into()));
    }

    #[test]
    fn test_record_id_from_str() {
        assert_eq!("15".parse::<RecordId>().unwrap(), RecordId::Int(15));
        assert_eq!(
            "abc-15".parse::<RecordId>().unwrap(),
            RecordId::Text("abc-15".into())
        );
    }

    #[test]
    fn test_unit_id_display() {
        let id = UnitId::new();
        let display = format!("{}", id);
        assert!(display.starts_with("uow-"));
        assert_eq!(display.len(), 12);
        assert!(!id.as_uuid().is_nil());
    }
}
