//! Audit record data structures
//!
//! `CapturedData` is what the recorder assembles for one change before it is
//! written; `AuditRecord` is the persisted, immutable row read back by the
//! query path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::action::ActionType;
use super::entity::Row;
use super::ids::RecordId;

/// Generic fields captured for one change
///
/// This is the input of a custom record mapper. Without a mapper it is
/// written as is, with `metadata` flattened into extra columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedData {
    pub action: ActionType,
    pub entity_key: String,
    pub entity_id: Option<RecordId>,
    pub context_entity_key: String,
    pub context_entity_id: Option<RecordId>,
    pub actor_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Diff map for UPDATE, full filtered payload for CREATE/DELETE
    pub content: Map<String, Value>,
    /// Extra columns contributed by the context
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CapturedData {
    /// Default row shape: metadata columns first, core columns on top
    pub fn into_row(self) -> Row {
        let mut row = self.metadata;

        let nullable = |id: Option<RecordId>| id.map(|i| i.to_value()).unwrap_or(Value::Null);

        row.insert("action".into(), Value::from(self.action.as_str()));
        row.insert("entity_key".into(), Value::from(self.entity_key));
        row.insert("entity_id".into(), nullable(self.entity_id));
        row.insert(
            "context_entity_key".into(),
            Value::from(self.context_entity_key),
        );
        row.insert("context_entity_id".into(), nullable(self.context_entity_id));
        row.insert("actor_id".into(), self.actor_id.to_value());
        if let Some(request_id) = self.request_id {
            row.insert("request_id".into(), Value::from(request_id));
        }
        if let Some(client_ip) = self.client_ip {
            row.insert("client_ip".into(), Value::from(client_ip));
        }
        row.insert("content".into(), Value::Object(self.content));
        row
    }
}

/// A persisted audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,

    /// Parent context key (e.g. `project`)
    pub context_entity_key: String,

    /// Parent record id
    #[serde(default)]
    pub context_entity_id: Option<RecordId>,

    /// Tracked entity key (e.g. `task`)
    pub entity_key: String,

    /// Id of the record that changed
    #[serde(default)]
    pub entity_id: Option<RecordId>,

    pub action: ActionType,

    /// Diff or full state
    #[serde(default)]
    pub content: Map<String, Value>,

    /// Who made the change
    #[serde(default)]
    pub actor_id: Option<RecordId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    /// When the record was written (UTC)
    pub created_at: DateTime<Utc>,

    /// Any extra columns present on the row
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn captured() -> CapturedData {
        let mut metadata = Map::new();
        metadata.insert("user_agent".into(), json!("curl"));
        metadata.insert("action".into(), json!("spoofed"));

        CapturedData {
            action: ActionType::Update,
            entity_key: "task".into(),
            entity_id: Some(RecordId::Int(4)),
            context_entity_key: "project".into(),
            context_entity_id: Some(RecordId::Int(1)),
            actor_id: RecordId::Text("u-9".into()),
            request_id: None,
            client_ip: Some("10.0.0.1".into()),
            content: json!({"title": {"old": "a", "new": "b"}})
                .as_object()
                .cloned()
                .unwrap(),
            metadata,
        }
    }

    #[test]
    fn test_into_row_core_columns_win() {
        let row = captured().into_row();
        assert_eq!(row["action"], json!("UPDATE"));
        assert_eq!(row["user_agent"], json!("curl"));
        assert_eq!(row["entity_id"], json!(4));
        assert_eq!(row["actor_id"], json!("u-9"));
        assert_eq!(row["client_ip"], json!("10.0.0.1"));
        assert!(!row.contains_key("request_id"));
    }

    #[test]
    fn test_record_from_row() {
        let mut row = captured().into_row();
        row.insert("id".into(), json!(12));
        row.insert("created_at".into(), json!("2025-03-01T10:00:00Z"));

        let record: AuditRecord = serde_json::from_value(Value::Object(row)).unwrap();
        assert_eq!(record.id, 12);
        assert_eq!(record.action, ActionType::Update);
        assert_eq!(record.entity_id, Some(RecordId::Int(4)));
        assert_eq!(record.metadata.get("user_agent"), Some(&json!("curl")));
    }
}
