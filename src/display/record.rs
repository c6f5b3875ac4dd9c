//! Audit record display formatting
//!
//! Formats audit records for terminal output in table and detail views.

use serde_json::{Map, Value};

use crate::audit::diff::format_value;
use crate::audit::{PageMeta, UnifiedContent};
use crate::models::{ActionType, AuditRecord, RecordId};

fn id_or_dash(id: Option<&RecordId>) -> String {
    id.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

/// Format one page of audit records as a table
pub fn format_record_list(records: &[AuditRecord], meta: &PageMeta) -> String {
    if records.is_empty() {
        return "No audit records found.\n".to_string();
    }

    let entity_width = records
        .iter()
        .map(|r| r.entity_key.len() + 1 + id_or_dash(r.entity_id.as_ref()).len())
        .max()
        .unwrap_or(6)
        .max(6);

    let context_width = records
        .iter()
        .map(|r| r.context_entity_key.len() + 1 + id_or_dash(r.context_entity_id.as_ref()).len())
        .max()
        .unwrap_or(7)
        .max(7);

    let mut output = String::new();
    output.push_str(&format!(
        "{:>6}  {:<19}  {:<6}  {:<entity_width$}  {:<context_width$}  {}\n",
        "ID",
        "Time (UTC)",
        "Action",
        "Entity",
        "Context",
        "Actor",
        entity_width = entity_width,
        context_width = context_width,
    ));

    output.push_str(&format!(
        "{:->6}  {:-<19}  {:-<6}  {:-<entity_width$}  {:-<context_width$}  {:-<8}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        entity_width = entity_width,
        context_width = context_width,
    ));

    for record in records {
        let entity = format!(
            "{}:{}",
            record.entity_key,
            id_or_dash(record.entity_id.as_ref())
        );
        let context = format!(
            "{}:{}",
            record.context_entity_key,
            id_or_dash(record.context_entity_id.as_ref())
        );

        output.push_str(&format!(
            "{:>6}  {:<19}  {:<6}  {:<entity_width$}  {:<context_width$}  {}\n",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.action,
            entity,
            context,
            id_or_dash(record.actor_id.as_ref()),
            entity_width = entity_width,
            context_width = context_width,
        ));
    }

    output.push_str(&format!(
        "\nPage {} of {} ({} records, {} per page)\n",
        meta.page,
        meta.total_pages.max(1),
        meta.total,
        meta.limit
    ));

    output
}

/// Format the header fields of a single record
pub fn format_record_details(record: &AuditRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("Audit record #{}\n", record.id));
    output.push_str(&format!("{}\n", "=".repeat(40)));
    output.push_str(&format!(
        "Time:     {}\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Action:   {}\n", record.action));
    output.push_str(&format!(
        "Entity:   {} {}\n",
        record.entity_key,
        id_or_dash(record.entity_id.as_ref())
    ));
    output.push_str(&format!(
        "Context:  {} {}\n",
        record.context_entity_key,
        id_or_dash(record.context_entity_id.as_ref())
    ));
    output.push_str(&format!("Actor:    {}\n", id_or_dash(record.actor_id.as_ref())));

    if let Some(request_id) = &record.request_id {
        output.push_str(&format!("Request:  {}\n", request_id));
    }
    if let Some(client_ip) = &record.client_ip {
        output.push_str(&format!("Client:   {}\n", client_ip));
    }

    if !record.metadata.is_empty() {
        output.push_str("Metadata:\n");
        for (key, value) in &record.metadata {
            output.push_str(&format!("  {}: {}\n", key, format_value(value)));
        }
    }

    if record.action == ActionType::Update {
        output.push_str("Changes:\n");
        for (path, change) in &record.content {
            let (old, new) = match change.as_object() {
                Some(pair) => (
                    pair.get("old").map(format_value),
                    pair.get("new").map(format_value),
                ),
                None => (None, Some(format_value(change))),
            };
            output.push_str(&format!(
                "  {}: {} -> {}\n",
                path,
                old.unwrap_or_else(|| "(absent)".into()),
                new.unwrap_or_else(|| "(absent)".into())
            ));
        }
    }

    output
}

/// Pretty-print one entity state
pub fn format_state(state: &Map<String, Value>) -> String {
    let value = Value::Object(state.clone());
    let mut output = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    output.push('\n');
    output
}

/// Old and new state one after the other
pub fn format_unified(unified: &UnifiedContent) -> String {
    let mut output = String::new();
    for (label, side) in [("Old", &unified.old), ("New", &unified.new)] {
        output.push_str(&format!("{}:\n", label));
        match side {
            Some(state) => output.push_str(&format_state(state)),
            None => output.push_str("(none)\n"),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(action: &str, content: Value) -> AuditRecord {
        serde_json::from_value(json!({
            "id": 42,
            "context_entity_key": "project",
            "context_entity_id": 1,
            "entity_key": "task",
            "entity_id": 7,
            "action": action,
            "content": content,
            "actor_id": "u-1",
            "created_at": "2025-01-15T10:30:00Z",
            "user_agent": "curl"
        }))
        .unwrap()
    }

    #[test]
    fn test_empty_list() {
        let meta = PageMeta {
            total: 0,
            page: 1,
            limit: 10,
            total_pages: 0,
        };
        assert_eq!(format_record_list(&[], &meta), "No audit records found.\n");
    }

    #[test]
    fn test_list_rows_and_footer() {
        let meta = PageMeta {
            total: 11,
            page: 2,
            limit: 10,
            total_pages: 2,
        };
        let output = format_record_list(&[record("CREATE", json!({"id": 7}))], &meta);

        assert!(output.contains("task:7"));
        assert!(output.contains("project:1"));
        assert!(output.contains("2025-01-15 10:30:00"));
        assert!(output.contains("u-1"));
        assert!(output.contains("Page 2 of 2 (11 records, 10 per page)"));
    }

    #[test]
    fn test_details_show_changes_and_metadata() {
        let output = format_record_details(&record(
            "UPDATE",
            json!({"status": {"old": "open", "new": "done"}, "tag": {"new": "x"}}),
        ));

        assert!(output.contains("Audit record #42"));
        assert!(output.contains("user_agent: \"curl\""));
        assert!(output.contains("status: \"open\" -> \"done\""));
        assert!(output.contains("tag: (absent) -> \"x\""));
    }

    #[test]
    fn test_unified_marks_missing_side() {
        let unified = UnifiedContent {
            old: None,
            new: json!({"a": 1}).as_object().cloned(),
        };
        let output = format_unified(&unified);
        assert!(output.starts_with("Old:\n(none)\nNew:\n"));
        assert!(output.contains("\"a\": 1"));
    }
}
