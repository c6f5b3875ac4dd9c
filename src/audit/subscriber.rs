//! Mutation hook handler
//!
//! Registered with a host engine, the subscriber turns the host's hook
//! stream into audit records. Inserts are recorded straight from the
//! after-insert hook. Updates and removes capture the before-state in the
//! before-hook (from complete event data, else by looking the rows up with
//! the carried criteria), buffer one pending log per affected row on the
//! unit, and flush them from the after-hook.
//!
//! A change with no resolvable actor is not recorded. The data mutation
//! itself still goes through; the violation is logged at error level and
//! kept on the subscriber until the caller takes it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, error, warn};

use super::carrier::{CriteriaCarrier, PendingAuditLog};
use super::context;
use super::policy::PolicyRegistry;
use super::recorder::{HistoryRecorder, LogRequest};
use crate::config::Settings;
use crate::error::{TrailError, TrailResult};
use crate::models::{ActionType, Criteria, EntityDescriptor, RecordId, Row};
use crate::storage::{
    InsertEvent, MutationHooks, OperationEvent, Persistence, RemoveEvent, UpdateEvent,
};

/// A change that went unrecorded because no actor was known
#[derive(Debug, Clone, PartialEq)]
pub struct AuditViolation {
    pub action: ActionType,
    pub entity_type: String,
    pub entity_key: String,
    pub entity_id: Option<RecordId>,
}

/// Audit-trail hooks for a host engine
pub struct HistorySubscriber {
    recorder: Arc<HistoryRecorder>,
    policies: Arc<PolicyRegistry>,
    carrier: CriteriaCarrier,
    ignored: HashSet<String>,
    intercept_criteria: bool,
    violations: Mutex<Vec<AuditViolation>>,
}

impl HistorySubscriber {
    pub fn new(
        settings: &Settings,
        policies: Arc<PolicyRegistry>,
        recorder: Arc<HistoryRecorder>,
    ) -> Self {
        Self {
            recorder,
            policies,
            carrier: CriteriaCarrier::new(),
            ignored: settings.ignored_set(),
            intercept_criteria: settings.intercept_criteria,
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Violations seen since the last call, oldest first
    pub fn take_violations(&self) -> TrailResult<Vec<AuditViolation>> {
        let mut violations = self.violations.lock().map_err(|e| {
            TrailError::Storage(format!("Failed to acquire lock: {}", e))
        })?;
        Ok(std::mem::take(&mut *violations))
    }

    fn should_track(&self, entity: &EntityDescriptor) -> bool {
        self.policies.is_tracked(&entity.name)
    }

    /// Rows selected by `criteria`, restricted to the auditable columns
    fn load_states(
        &self,
        entity: &EntityDescriptor,
        criteria: &Criteria,
        manager: &dyn Persistence,
    ) -> TrailResult<Vec<Row>> {
        let select = self.policies.build_select(entity, &self.ignored);
        manager.find(entity, criteria, select.as_deref())
    }

    /// Queue a log on the manager's unit, or write it now when there is none
    fn buffer(&self, pending: PendingAuditLog, manager: &dyn Persistence) -> TrailResult<()> {
        match self.carrier.buffer_log(manager.unit(), pending) {
            Some(immediate) => self.process_log(immediate, manager),
            None => Ok(()),
        }
    }

    fn flush(&self, manager: &dyn Persistence) -> TrailResult<()> {
        let Some(unit) = manager.unit() else {
            return Ok(());
        };
        self.carrier
            .flush(unit, |pending| self.process_log(pending, manager))
            .map(|_| ())
    }

    fn process_log(&self, pending: PendingAuditLog, manager: &dyn Persistence) -> TrailResult<()> {
        if context::is_ignored() {
            debug!(entity_type = %pending.entity.name, "recording suppressed");
            return Ok(());
        }

        let Some(tracker) = self.policies.tracker(&pending.entity.name) else {
            return Ok(());
        };

        let request = LogRequest {
            action: pending.action,
            entity: &pending.entity,
            entity_key: &tracker.entity_key,
            old_state: pending.old_state.as_ref(),
            new_state: pending.new_state.as_ref(),
            context: None,
        };
        match self.recorder.save_log(&request, manager) {
            Ok(_) => Ok(()),
            Err(TrailError::MissingActor { entity_key }) => {
                let entity_id = pending
                    .new_state
                    .as_ref()
                    .or(pending.old_state.as_ref())
                    .and_then(|row| pending.entity.extract_id(row));
                error!(
                    entity_key = %entity_key,
                    entity_type = %pending.entity.name,
                    action = %pending.action,
                    "strict auditing violation: no actor_id, change left unrecorded"
                );
                self.violations
                    .lock()
                    .map_err(|e| TrailError::Storage(format!("Failed to acquire lock: {}", e)))?
                    .push(AuditViolation {
                        action: pending.action,
                        entity_type: pending.entity.name.clone(),
                        entity_key,
                        entity_id,
                    });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `old` overlaid with every key of `partial`
fn merge_defined(old: &Row, partial: Option<&Row>) -> Row {
    let mut merged = old.clone();
    if let Some(partial) = partial {
        for (key, value) in partial {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn complete<'a>(entity: &EntityDescriptor, row: Option<&'a Row>) -> Option<&'a Row> {
    row.filter(|r| entity.is_data_complete(r))
}

impl MutationHooks for HistorySubscriber {
    fn before_operation(&self, event: &OperationEvent<'_>) {
        if self.intercept_criteria && self.should_track(event.entity) {
            self.carrier
                .attach(event.manager.unit(), &event.entity.name, event.criteria.cloned());
        }
    }

    fn after_operation(&self, event: &OperationEvent<'_>) {
        if self.intercept_criteria && self.should_track(event.entity) {
            self.carrier.clear(event.manager.unit(), &event.entity.name);
        }
    }

    fn after_insert(&self, event: &InsertEvent<'_>) -> TrailResult<()> {
        if !self.should_track(event.entity) {
            return Ok(());
        }

        let Some(id) = event.entity.key_values(event.row) else {
            return Ok(());
        };
        let id = Value::Object(id);

        let Some(resolved) = self
            .carrier
            .resolve(Some(&id), event.entity, event.manager.unit())
        else {
            return Ok(());
        };
        let Some(criteria) = resolved.sealed.criteria else {
            return Ok(());
        };

        let new_state = match complete(event.entity, Some(event.row)) {
            Some(row) => row.clone(),
            None => match event.manager.find(event.entity, &criteria, None)?.into_iter().next() {
                Some(row) => row,
                None => return Ok(()),
            },
        };

        self.process_log(
            PendingAuditLog {
                action: ActionType::Create,
                entity: event.entity.clone(),
                old_state: None,
                new_state: Some(new_state),
                unit_id: None,
            },
            event.manager,
        )
    }

    fn before_update(&self, event: &UpdateEvent<'_>) -> TrailResult<()> {
        if !self.should_track(event.entity) {
            return Ok(());
        }

        let data = event.row.or(event.database_row).cloned().map(Value::Object);
        let resolved = self
            .carrier
            .resolve(data.as_ref(), event.entity, event.manager.unit());
        let Some((criteria, from_carrier)) =
            resolved.and_then(|r| r.sealed.criteria.map(|c| (c, r.from_carrier)))
        else {
            warn!(
                entity_type = %event.entity.name,
                "cannot record update: no criteria identifies the affected rows"
            );
            return Ok(());
        };

        if !self.intercept_criteria && !from_carrier {
            return Ok(());
        }

        let old_states = match complete(event.entity, event.database_row) {
            Some(row) => vec![row.clone()],
            None => self.load_states(event.entity, &criteria, event.manager)?,
        };

        for old_state in old_states {
            let new_state = merge_defined(&old_state, event.row);
            self.buffer(
                PendingAuditLog {
                    action: ActionType::Update,
                    entity: event.entity.clone(),
                    old_state: Some(old_state),
                    new_state: Some(new_state),
                    unit_id: None,
                },
                event.manager,
            )?;
        }
        Ok(())
    }

    fn after_update(&self, event: &UpdateEvent<'_>) -> TrailResult<()> {
        self.flush(event.manager)
    }

    fn before_remove(&self, event: &RemoveEvent<'_>) -> TrailResult<()> {
        if !self.should_track(event.entity) {
            return Ok(());
        }

        let data = event
            .row
            .or(event.database_row)
            .cloned()
            .map(Value::Object)
            .or_else(|| event.entity_id.cloned());
        let resolved = self
            .carrier
            .resolve(data.as_ref(), event.entity, event.manager.unit());
        let Some((criteria, from_carrier)) =
            resolved.and_then(|r| r.sealed.criteria.map(|c| (c, r.from_carrier)))
        else {
            return Ok(());
        };

        if !self.intercept_criteria && !from_carrier {
            return Ok(());
        }

        let items = match complete(event.entity, event.database_row) {
            Some(row) => vec![row.clone()],
            None => self.load_states(event.entity, &criteria, event.manager)?,
        };

        for item in items {
            self.buffer(
                PendingAuditLog {
                    action: ActionType::Delete,
                    entity: event.entity.clone(),
                    old_state: Some(item),
                    new_state: None,
                    unit_id: None,
                },
                event.manager,
            )?;
        }
        Ok(())
    }

    fn after_remove(&self, event: &RemoveEvent<'_>) -> TrailResult<()> {
        self.flush(event.manager)
    }
}
