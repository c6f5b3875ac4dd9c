//! Reconstruction of entity state from audit records
//!
//! CREATE records carry the full new state, DELETE records the full old
//! state, UPDATE records a diff map from which either side can be extracted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path;
use crate::error::TrailResult;
use crate::models::{ActionType, AuditRecord, Row};

/// Anything shaped like an audit record
pub trait HistoryLogLike {
    fn action(&self) -> Option<ActionType>;
    fn content(&self) -> Option<&Map<String, Value>>;
}

impl HistoryLogLike for AuditRecord {
    fn action(&self) -> Option<ActionType> {
        Some(self.action)
    }

    fn content(&self) -> Option<&Map<String, Value>> {
        Some(&self.content)
    }
}

/// Raw audit rows, e.g. custom record shapes read back from a store
impl HistoryLogLike for Row {
    fn action(&self) -> Option<ActionType> {
        self.get("action")?.as_str()?.parse().ok()
    }

    fn content(&self) -> Option<&Map<String, Value>> {
        self.get("content")?.as_object()
    }
}

/// Which state of the change to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Old,
    #[default]
    New,
}

impl Side {
    fn key(self) -> &'static str {
        match self {
            Side::Old => "old",
            Side::New => "new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapToEntityOptions {
    pub side: Side,
    /// Turn escaped dot-paths of UPDATE diffs back into nested maps
    pub unflatten: bool,
}

impl Default for MapToEntityOptions {
    fn default() -> Self {
        Self {
            side: Side::New,
            unflatten: true,
        }
    }
}

/// Both states of a change side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedContent {
    pub old: Option<Map<String, Value>>,
    pub new: Option<Map<String, Value>>,
}

/// Partial entity state captured by `log` on the requested side
///
/// CREATE yields the content on the new side and nothing on the old side;
/// DELETE the other way round. An unknown action yields an empty map.
pub fn map_to_entity(log: &impl HistoryLogLike, options: &MapToEntityOptions) -> Map<String, Value> {
    let empty = Map::new();
    let content = log.content().unwrap_or(&empty);

    match log.action() {
        Some(ActionType::Update) => {
            let extracted = extract_side(content, options.side);
            if options.unflatten {
                path::unflatten(&extracted)
            } else {
                extracted
            }
        }
        Some(ActionType::Create) if options.side == Side::New => content.clone(),
        Some(ActionType::Delete) if options.side == Side::Old => content.clone(),
        _ => Map::new(),
    }
}

/// `map_to_entity` deserialized into a caller type
pub fn map_to_entity_as<T: DeserializeOwned>(
    log: &impl HistoryLogLike,
    options: &MapToEntityOptions,
) -> TrailResult<T> {
    Ok(serde_json::from_value(Value::Object(map_to_entity(log, options)))?)
}

/// Old and new state of `log`, each unflattened
pub fn map_to_unified(log: &impl HistoryLogLike) -> UnifiedContent {
    let empty = Map::new();
    let content = log.content().unwrap_or(&empty);

    match log.action() {
        Some(ActionType::Create) => UnifiedContent {
            old: None,
            new: Some(path::unflatten(content)),
        },
        Some(ActionType::Delete) => UnifiedContent {
            old: Some(path::unflatten(content)),
            new: None,
        },
        Some(ActionType::Update) => UnifiedContent {
            old: Some(path::unflatten(&extract_side(content, Side::Old))),
            new: Some(path::unflatten(&extract_side(content, Side::New))),
        },
        None => UnifiedContent {
            old: None,
            new: None,
        },
    }
}

/// Pick one side out of each `{old, new}` entry; other entries pass through
fn extract_side(content: &Map<String, Value>, side: Side) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in content {
        match value.as_object() {
            Some(pair) if pair.contains_key("old") || pair.contains_key("new") => {
                if let Some(v) = pair.get(side.key()) {
                    result.insert(key.clone(), v.clone());
                }
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(action: &str, content: Value) -> Row {
        json!({"action": action, "content": content})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_unified_create() {
        let unified = map_to_unified(&log("CREATE", json!({"a": 1})));
        assert_eq!(unified.old, None);
        assert_eq!(Value::Object(unified.new.unwrap()), json!({"a": 1}));
    }

    #[test]
    fn test_unified_update_unflattens_both_sides() {
        let unified = map_to_unified(&log(
            "UPDATE",
            json!({
                "profile.bio": {"old": "Hi", "new": "Hello"},
                "v\\.1": {"old": 1, "new": 2}
            }),
        ));
        assert_eq!(
            Value::Object(unified.old.unwrap()),
            json!({"profile": {"bio": "Hi"}, "v.1": 1})
        );
        assert_eq!(
            Value::Object(unified.new.unwrap()),
            json!({"profile": {"bio": "Hello"}, "v.1": 2})
        );
    }

    #[test]
    fn test_unified_delete_and_unknown() {
        let unified = map_to_unified(&log("DELETE", json!({"id": 3})));
        assert_eq!(Value::Object(unified.old.unwrap()), json!({"id": 3}));
        assert!(unified.new.is_none());

        let unknown = map_to_unified(&log("ARCHIVE", json!({"id": 3})));
        assert_eq!(unknown, UnifiedContent { old: None, new: None });
    }

    #[test]
    fn test_entity_sides_for_create_and_delete() {
        let create = log("CREATE", json!({"title": "T"}));
        let old = MapToEntityOptions {
            side: Side::Old,
            ..Default::default()
        };
        assert_eq!(
            Value::Object(map_to_entity(&create, &MapToEntityOptions::default())),
            json!({"title": "T"})
        );
        assert!(map_to_entity(&create, &old).is_empty());

        let delete = log("DELETE", json!({"title": "T"}));
        assert_eq!(Value::Object(map_to_entity(&delete, &old)), json!({"title": "T"}));
        assert!(map_to_entity(&delete, &MapToEntityOptions::default()).is_empty());
    }

    #[test]
    fn test_update_passes_through_legacy_entries() {
        let update = log(
            "UPDATE",
            json!({"status": {"old": "open", "new": "done"}, "note": "legacy"}),
        );
        let old = MapToEntityOptions {
            side: Side::Old,
            unflatten: false,
        };
        assert_eq!(
            Value::Object(map_to_entity(&update, &old)),
            json!({"status": "open", "note": "legacy"})
        );
    }

    #[test]
    fn test_flat_update_keeps_escaped_keys() {
        let update = log("UPDATE", json!({"a.b": {"old": 1, "new": 2}}));
        let flat = MapToEntityOptions {
            side: Side::New,
            unflatten: false,
        };
        assert_eq!(Value::Object(map_to_entity(&update, &flat)), json!({"a.b": 2}));
        assert_eq!(
            Value::Object(map_to_entity(&update, &MapToEntityOptions::default())),
            json!({"a": {"b": 2}})
        );
    }

    #[test]
    fn test_typed_record_and_deserialize() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Task {
            title: String,
        }

        let record: AuditRecord = serde_json::from_value(json!({
            "id": 1,
            "context_entity_key": "project",
            "entity_key": "task",
            "entity_id": 4,
            "action": "UPDATE",
            "content": {"title": {"old": "A", "new": "B"}},
            "actor_id": 1,
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();

        let task: Task = map_to_entity_as(&record, &MapToEntityOptions::default()).unwrap();
        assert_eq!(task, Task { title: "B".into() });
    }
}
