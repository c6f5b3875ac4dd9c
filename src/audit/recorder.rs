//! Audit record builder
//!
//! Turns one observed change into one audit row: resolves the causal
//! context, identifies the record, filters the payloads, computes the
//! content and writes the row through the host's audit-log store.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, instrument};

use super::carrier::CriteriaCarrier;
use super::context;
use super::diff;
use super::policy::PolicyRegistry;
use crate::config::Settings;
use crate::error::TrailResult;
use crate::models::{ActionType, CapturedData, EntityDescriptor, PartialContext, Row};
use crate::storage::Persistence;

/// Maps captured data to a custom audit-row shape
pub type RecordMapper = Arc<dyn Fn(&CapturedData) -> Row + Send + Sync>;

/// One change to record
#[derive(Debug, Clone)]
pub struct LogRequest<'a> {
    pub action: ActionType,
    pub entity: &'a EntityDescriptor,
    /// Key the type is recorded under (e.g. `task`)
    pub entity_key: &'a str,
    pub old_state: Option<&'a Row>,
    pub new_state: Option<&'a Row>,
    /// Manual override, highest priority
    pub context: Option<PartialContext>,
}

/// Builds and writes audit rows
pub struct HistoryRecorder {
    policies: Arc<PolicyRegistry>,
    ignored: HashSet<String>,
    soft_delete_field: String,
    mapper: Option<RecordMapper>,
    carrier: CriteriaCarrier,
}

impl HistoryRecorder {
    pub fn new(settings: &Settings, policies: Arc<PolicyRegistry>) -> Self {
        Self {
            policies,
            ignored: settings.ignored_set(),
            soft_delete_field: settings.soft_delete_field.clone(),
            mapper: None,
            carrier: CriteriaCarrier::new(),
        }
    }

    #[must_use]
    pub fn with_mapper(mut self, mapper: RecordMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Merge manual, sealed and ambient context for `entity_type`
    pub fn resolve_context(
        &self,
        manager: &dyn Persistence,
        entity_type: &str,
        manual: Option<PartialContext>,
    ) -> PartialContext {
        let sealed = self
            .carrier
            .sealed(manager.unit(), entity_type)
            .map(|s| s.context);
        context::resolve(manual, sealed, context::ambient_context())
    }

    /// Assemble the captured data for a change
    ///
    /// Returns `Ok(None)` when the change is skipped: no identifiable record,
    /// or an UPDATE that changed no audited column.
    pub fn build(
        &self,
        request: &LogRequest<'_>,
        manager: &dyn Persistence,
    ) -> TrailResult<Option<CapturedData>> {
        let entity = request.entity;
        let effective = self
            .resolve_context(manager, &entity.name, request.context.clone())
            .into_effective(request.entity_key)?;

        let empty = Row::new();
        let old = request.old_state.unwrap_or(&empty);
        let new = request.new_state.unwrap_or(&empty);

        let mut merged = old.clone();
        merged.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
        let Some(entity_id) = entity.extract_id(&merged) else {
            error!(
                entity_key = request.entity_key,
                action = %request.action,
                "cannot determine entity id, skipping audit record"
            );
            return Ok(None);
        };

        let action = self.reclassify(request.action, old, new);

        let filtered_old = self.policies.filter_payload(entity, old, &self.ignored);
        let filtered_new = self.policies.filter_payload(entity, new, &self.ignored);

        let content = match action {
            ActionType::Create => filtered_new,
            ActionType::Delete => filtered_old,
            ActionType::Update => {
                let changes = diff::diff_maps(&filtered_old, &filtered_new);
                if changes.is_empty() {
                    debug!(
                        entity_key = request.entity_key,
                        entity_id = %entity_id,
                        "no audited column changed, skipping"
                    );
                    return Ok(None);
                }
                diff::into_content(changes)
            }
        };

        Ok(Some(CapturedData {
            action,
            entity_key: request.entity_key.to_string(),
            entity_id: Some(entity_id),
            context_entity_key: effective.context_entity_key,
            context_entity_id: effective.context_entity_id,
            actor_id: effective.actor_id,
            request_id: effective.request_id,
            client_ip: effective.client_ip,
            content,
            metadata: effective.metadata,
        }))
    }

    /// Build the audit row for a change and write it
    ///
    /// Returns the row as written, or `None` when the change was skipped.
    #[instrument(
        skip(self, request, manager),
        fields(entity_key = request.entity_key, action = %request.action)
    )]
    pub fn save_log(
        &self,
        request: &LogRequest<'_>,
        manager: &dyn Persistence,
    ) -> TrailResult<Option<Row>> {
        let Some(captured) = self.build(request, manager)? else {
            return Ok(None);
        };

        let row = match &self.mapper {
            Some(mapper) => mapper(&captured),
            None => captured.into_row(),
        };

        let written = manager.append_log(row)?;
        debug!(id = ?written.get("id"), "audit record written");
        Ok(Some(written))
    }

    /// A soft-delete flag flipping false -> true records as DELETE
    fn reclassify(&self, action: ActionType, old: &Row, new: &Row) -> ActionType {
        if action != ActionType::Update {
            return action;
        }

        let field = self.soft_delete_field.as_str();
        match (old.get(field), new.get(field)) {
            (Some(Value::Bool(false)), Some(Value::Bool(true))) => ActionType::Delete,
            _ => action,
        }
    }
}
