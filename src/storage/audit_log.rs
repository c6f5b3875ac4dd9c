//! Append-only JSONL audit log
//!
//! Each audit row is written as a single JSON line and flushed immediately.
//! Ids are assigned sequentially from the highest id already in the file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;

use super::AuditLogStore;
use crate::audit::query::LogQuery;
use crate::error::{TrailError, TrailResult};
use crate::models::{AuditRecord, Row};

/// Audit-log store backed by a line-delimited JSON file
pub struct JsonlAuditLog {
    /// Path to the audit log file
    log_path: PathBuf,
    /// Last id handed out; loaded from the file on first append
    last_id: Mutex<Option<u64>>,
}

impl JsonlAuditLog {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            last_id: Mutex::new(None),
        }
    }

    /// Append a row as is
    ///
    /// No id or timestamp is assigned; use `append_log` for that.
    pub fn log(&self, row: &Row) -> TrailResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| TrailError::Io(format!("Failed to open audit log: {}", e)))?;

        let json = serde_json::to_string(row)
            .map_err(|e| TrailError::Json(format!("Failed to serialize audit row: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| TrailError::Io(format!("Failed to write audit row: {}", e)))?;

        file.flush()
            .map_err(|e| TrailError::Io(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Read every row, oldest first
    pub fn read_all(&self) -> TrailResult<Vec<Row>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| TrailError::Io(format!("Failed to open audit log: {}", e)))?;

        let reader = BufReader::new(file);
        let mut rows = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                TrailError::Io(format!("Failed to read audit log line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let row: Row = serde_json::from_str(&line).map_err(|e| {
                TrailError::Json(format!(
                    "Failed to parse audit row at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            rows.push(row);
        }

        Ok(rows)
    }

    /// Load one record by id
    pub fn get(&self, id: u64) -> TrailResult<Option<AuditRecord>> {
        let found = self
            .read_all()?
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_u64) == Some(id));

        match found {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self) -> bool {
        self.log_path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn next_id(&self, last_id: &mut Option<u64>) -> TrailResult<u64> {
        let current = match *last_id {
            Some(id) => id,
            None => self
                .read_all()?
                .iter()
                .filter_map(|row| row.get("id").and_then(Value::as_u64))
                .max()
                .unwrap_or(0),
        };
        let next = current + 1;
        *last_id = Some(next);
        Ok(next)
    }
}

impl AuditLogStore for JsonlAuditLog {
    fn append_log(&self, mut row: Row) -> TrailResult<Row> {
        let mut last_id = self
            .last_id
            .lock()
            .map_err(|e| TrailError::Storage(format!("Failed to acquire audit log lock: {}", e)))?;

        let id = self.next_id(&mut last_id)?;
        row.insert("id".into(), Value::from(id));
        if !row.contains_key("created_at") {
            row.insert("created_at".into(), Value::from(Utc::now().to_rfc3339()));
        }

        self.log(&row)?;
        Ok(row)
    }

    fn find_logs(&self, query: &LogQuery) -> TrailResult<(Vec<Row>, u64)> {
        Ok(query.apply(self.read_all()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::query::{find_all, FindAllOptions};
    use crate::models::{ActionType, CapturedData, RecordId};
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn create_test_log() -> (JsonlAuditLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(temp_dir.path().join("audit.log"));
        (log, temp_dir)
    }

    fn captured(entity_id: i64) -> Row {
        CapturedData {
            action: ActionType::Create,
            entity_key: "task".into(),
            entity_id: Some(RecordId::Int(entity_id)),
            context_entity_key: "project".into(),
            context_entity_id: Some(RecordId::Int(1)),
            actor_id: RecordId::Int(42),
            request_id: None,
            client_ip: None,
            content: json!({"id": entity_id, "title": "Write docs"})
                .as_object()
                .cloned()
                .unwrap(),
            metadata: Map::new(),
        }
        .into_row()
    }

    #[test]
    fn test_append_and_read_back() {
        let (log, _temp) = create_test_log();
        assert!(!log.exists());

        let written = log.append_log(captured(7)).unwrap();
        assert_eq!(written["id"], json!(1));
        assert!(written.contains_key("created_at"));
        assert!(log.exists());

        let record = log.get(1).unwrap().unwrap();
        assert_eq!(record.action, ActionType::Create);
        assert_eq!(record.entity_id, Some(RecordId::Int(7)));
        assert_eq!(record.actor_id, Some(RecordId::Int(42)));
        assert!(log.get(2).unwrap().is_none());
    }

    #[test]
    fn test_ids_continue_across_instances() {
        let (log, temp) = create_test_log();
        log.append_log(captured(1)).unwrap();
        log.append_log(captured(2)).unwrap();

        let reopened = JsonlAuditLog::new(temp.path().join("audit.log"));
        let written = reopened.append_log(captured(3)).unwrap();
        assert_eq!(written["id"], json!(3));
        assert_eq!(reopened.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_query_through_store() {
        let (log, _temp) = create_test_log();
        for i in 0..12 {
            log.append_log(captured(i)).unwrap();
        }

        let result = find_all::<AuditRecord>(&log, &FindAllOptions::new().page(2, 5), 10).unwrap();
        assert_eq!(result.items.len(), 5);
        assert_eq!(result.meta.total, 12);
        assert_eq!(result.meta.total_pages, 3);
        // newest first: ids 12..1, page 2 starts at id 7
        assert_eq!(result.items[0].id, 7);
    }

    #[test]
    fn test_empty_and_corrupt_lines() {
        let (log, _temp) = create_test_log();
        std::fs::write(log.path(), "\n{\"id\": 1}\n\n").unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);

        std::fs::write(log.path(), "not json\n").unwrap();
        assert!(matches!(log.read_all(), Err(TrailError::Json(_))));
    }
}
