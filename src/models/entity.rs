//! Host-supplied metadata about a persisted entity type

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::RecordId;

/// Generic record shape: column name to JSON value
pub type Row = Map<String, Value>;

/// Describes one entity type as the host persistence engine knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Type name, e.g. `Project`
    pub name: String,

    /// Primary-key columns, in declaration order
    pub primary_keys: Vec<String>,

    /// Every persisted column, primary keys included
    pub columns: Vec<String>,
}

impl EntityDescriptor {
    /// Create a descriptor with a single `id` primary key
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::with_keys(name, &["id"], columns)
    }

    /// Create a descriptor with explicit primary-key columns
    ///
    /// Key columns missing from `columns` are prepended.
    pub fn with_keys(name: impl Into<String>, keys: &[&str], columns: &[&str]) -> Self {
        let mut all: Vec<String> = keys
            .iter()
            .filter(|k| !columns.contains(k))
            .map(|k| k.to_string())
            .collect();
        all.extend(columns.iter().map(|c| c.to_string()));

        Self {
            name: name.into(),
            primary_keys: keys.iter().map(|k| k.to_string()).collect(),
            columns: all,
        }
    }

    /// Check if `column` is part of the primary key
    pub fn is_primary(&self, column: &str) -> bool {
        self.primary_keys.iter().any(|k| k == column)
    }

    /// The first primary-key column, `id` when none is declared
    pub fn primary_column(&self) -> &str {
        self.primary_keys.first().map(String::as_str).unwrap_or("id")
    }

    /// Extract the primary-key values present in `row`
    ///
    /// Returns `None` unless every key column holds a non-null value.
    pub fn key_values(&self, row: &Row) -> Option<Row> {
        let mut keys = Row::new();
        for pk in &self.primary_keys {
            match row.get(pk) {
                Some(v) if !v.is_null() => {
                    keys.insert(pk.clone(), v.clone());
                }
                _ => return None,
            }
        }
        if keys.is_empty() {
            None
        } else {
            Some(keys)
        }
    }

    /// Normalized identity of `row`
    ///
    /// Single keys keep their value; composite keys become the compact JSON
    /// text of the key object.
    pub fn extract_id(&self, row: &Row) -> Option<RecordId> {
        let keys = self.key_values(row)?;
        if keys.len() == 1 {
            keys.values().next().and_then(RecordId::from_value)
        } else {
            Some(RecordId::Text(Value::Object(keys).to_string()))
        }
    }

    /// Check whether `row` carries every column of this entity with a usable key
    pub fn is_data_complete(&self, row: &Row) -> bool {
        if self.key_values(row).is_none() {
            return false;
        }
        self.columns.iter().all(|c| row.contains_key(c))
    }
}
