//! Tracking declarations and per-column audit policy
//!
//! The registry is populated once at startup: which entity types are
//! tracked (and under which key they appear in the trail), and which columns
//! are explicitly excluded from or included in audit payloads.

use std::collections::{HashMap, HashSet};

use crate::models::{EntityDescriptor, Row};

/// Per-column policy declared on an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPolicy {
    /// Never written to the trail
    Excluded,
    /// Always written, even when globally ignored
    Included,
    /// Follows the global ignored-key set
    #[default]
    Default,
}

/// Tracking options for one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerOptions {
    /// Stable key identifying the type in the trail (e.g. `task`)
    pub entity_key: String,
}

#[derive(Debug, Clone, Default)]
struct EntityPolicy {
    tracker: Option<TrackerOptions>,
    excluded: HashSet<String>,
    included: HashSet<String>,
}

/// Static registry of tracked types and column policies
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    entities: HashMap<String, EntityPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `entity_type` as tracked under `entity_key`
    pub fn track(&mut self, entity_type: &str, entity_key: &str) -> &mut Self {
        self.entry(entity_type).tracker = Some(TrackerOptions {
            entity_key: entity_key.to_string(),
        });
        self
    }

    /// Keep `field` out of every payload for `entity_type`
    pub fn exclude(&mut self, entity_type: &str, field: &str) -> &mut Self {
        self.entry(entity_type).excluded.insert(field.to_string());
        self
    }

    /// Keep `field` in payloads even when it is globally ignored
    pub fn include(&mut self, entity_type: &str, field: &str) -> &mut Self {
        self.entry(entity_type).included.insert(field.to_string());
        self
    }

    fn entry(&mut self, entity_type: &str) -> &mut EntityPolicy {
        self.entities.entry(entity_type.to_string()).or_default()
    }

    /// Tracking options, if the type is tracked
    pub fn tracker(&self, entity_type: &str) -> Option<&TrackerOptions> {
        self.entities
            .get(entity_type)
            .and_then(|p| p.tracker.as_ref())
    }

    pub fn is_tracked(&self, entity_type: &str) -> bool {
        self.tracker(entity_type).is_some()
    }

    /// Declared policy for a column; exclusion wins over inclusion
    pub fn field_policy(&self, entity_type: &str, field: &str) -> FieldPolicy {
        match self.entities.get(entity_type) {
            Some(p) if p.excluded.contains(field) => FieldPolicy::Excluded,
            Some(p) if p.included.contains(field) => FieldPolicy::Included,
            _ => FieldPolicy::Default,
        }
    }

    /// Decide whether `field` enters the audit payload
    ///
    /// Primary keys always do. Otherwise: excluded > included > globally
    /// ignored > included by default.
    pub fn should_include(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        ignored: &HashSet<String>,
    ) -> bool {
        if entity.is_primary(field) {
            return true;
        }
        match self.field_policy(&entity.name, field) {
            FieldPolicy::Excluded => false,
            FieldPolicy::Included => true,
            FieldPolicy::Default => !ignored.contains(field),
        }
    }

    /// Filter a payload down to the columns that may be audited
    ///
    /// An empty payload is returned unchanged.
    pub fn filter_payload(
        &self,
        entity: &EntityDescriptor,
        payload: &Row,
        ignored: &HashSet<String>,
    ) -> Row {
        if payload.is_empty() {
            return payload.clone();
        }

        payload
            .iter()
            .filter(|(key, _)| self.should_include(entity, key, ignored))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Column selection for before-state lookups
    ///
    /// Mirrors `filter_payload`; returns `None` when no column is filtered
    /// out, meaning "select everything".
    pub fn build_select(
        &self,
        entity: &EntityDescriptor,
        ignored: &HashSet<String>,
    ) -> Option<Vec<String>> {
        let select: Vec<String> = entity
            .columns
            .iter()
            .filter(|c| self.should_include(entity, c, ignored))
            .cloned()
            .collect();

        if select.len() == entity.columns.len() {
            None
        } else {
            Some(select)
        }
    }
}
