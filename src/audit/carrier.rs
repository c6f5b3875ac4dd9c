//! Criteria carrier and per-unit audit buffer
//!
//! Criteria-based operations (`update(criteria, values)`, `delete(criteria)`)
//! reach the row hooks without the selection that produced them. The carrier
//! seals that selection together with a snapshot of the ambient context into
//! the unit of work when the operation starts, lets the hooks resolve it, and
//! clears it when the operation ends.
//!
//! Audit logs produced inside a unit are buffered in the same side-table and
//! only written when the unit is flushed, so a rolled-back unit leaves no
//! trace in the trail.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::context;
use crate::ambient;
use crate::error::TrailResult;
use crate::models::{ActionType, Criteria, EntityDescriptor, PartialContext, Row, UnitId};
use crate::storage::UnitOfWork;

/// Prefix of the ambient keys carrying criteria outside of a unit
pub const CRITERIA_KEY_PREFIX: &str = "history.criteria.";

/// Criteria and context snapshot captured when an operation starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SealedContext {
    /// `None` when the affected rows were not known yet (insert, upsert)
    pub criteria: Option<Criteria>,
    pub context: PartialContext,
}

/// Outcome of a carrier lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub sealed: SealedContext,
    /// `true` when the criteria came from an operation the carrier intercepted
    pub from_carrier: bool,
}

/// An audit log waiting for its unit to commit
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAuditLog {
    pub action: ActionType,
    pub entity: EntityDescriptor,
    pub old_state: Option<Row>,
    pub new_state: Option<Row>,
    pub unit_id: Option<UnitId>,
}

#[derive(Debug, Default)]
struct UnitAuditState {
    sealed: HashMap<String, SealedContext>,
    pending: Vec<PendingAuditLog>,
}

/// Seals, resolves and buffers audit state for units of work
#[derive(Debug, Clone, Copy, Default)]
pub struct CriteriaCarrier;

impl CriteriaCarrier {
    pub fn new() -> Self {
        Self
    }

    /// Seal `criteria` and the current ambient context for `entity_type`
    ///
    /// The snapshot goes into the unit's side-table when there is a unit; the
    /// criteria are also recorded in the ambient scope when one is active.
    pub fn attach(&self, unit: Option<&UnitOfWork>, entity_type: &str, criteria: Option<Criteria>) {
        if ambient::is_active() {
            let value = criteria
                .as_ref()
                .and_then(|c| serde_json::to_value(c).ok())
                .unwrap_or(Value::Null);
            ambient::set(&ambient_key(entity_type), value);
        }

        if let Some(unit) = unit {
            let sealed = SealedContext {
                criteria,
                context: context::ambient_context().unwrap_or_default(),
            };
            debug!(unit = %unit.id(), entity_type, "sealing criteria");
            unit.with_data::<UnitAuditState, _>(|state| {
                state.sealed.insert(entity_type.to_string(), sealed);
            });
        }
    }

    /// Drop whatever `attach` stored for `entity_type`
    pub fn clear(&self, unit: Option<&UnitOfWork>, entity_type: &str) {
        if let Some(unit) = unit {
            unit.with_data::<UnitAuditState, _>(|state| {
                state.sealed.remove(entity_type);
            });
        }
        ambient::remove(&ambient_key(entity_type));
    }

    /// Snapshot sealed for `entity_type` in `unit`, if any
    pub fn sealed(&self, unit: Option<&UnitOfWork>, entity_type: &str) -> Option<SealedContext> {
        unit?
            .peek::<UnitAuditState, _>(|state| state.sealed.get(entity_type).cloned())
            .flatten()
    }

    /// Find the criteria selecting the rows a hook is about to touch
    ///
    /// In order: a sealed snapshot (criteria synthesized from `data`'s
    /// primary keys when it carries none), ambient criteria, criteria built
    /// from `data` itself. `None` when nothing identifies the rows.
    pub fn resolve(
        &self,
        data: Option<&Value>,
        entity: &EntityDescriptor,
        unit: Option<&UnitOfWork>,
    ) -> Option<Resolved> {
        if let Some(sealed) = self.sealed(unit, &entity.name) {
            let criteria = match sealed.criteria {
                Some(criteria) => Some(criteria),
                None => data.and_then(|d| criteria_from_data(d, entity)),
            };
            return Some(Resolved {
                sealed: SealedContext {
                    criteria,
                    context: sealed.context,
                },
                from_carrier: true,
            });
        }

        let criteria = ambient::get_as::<Criteria>(&ambient_key(&entity.name))
            .or_else(|| data.and_then(|d| criteria_from_data(d, entity)))?;

        Some(Resolved {
            sealed: SealedContext {
                criteria: Some(criteria),
                context: PartialContext::default(),
            },
            from_carrier: false,
        })
    }

    /// Queue `pending` on its unit
    ///
    /// Returns the entry back when there is no unit to queue on; the caller
    /// writes it immediately.
    pub fn buffer_log(
        &self,
        unit: Option<&UnitOfWork>,
        mut pending: PendingAuditLog,
    ) -> Option<PendingAuditLog> {
        let Some(unit) = unit else {
            return Some(pending);
        };

        pending.unit_id = Some(unit.id());
        unit.with_data::<UnitAuditState, _>(|state| state.pending.push(pending));
        None
    }

    /// Number of logs buffered on `unit`
    pub fn pending_len(&self, unit: &UnitOfWork) -> usize {
        unit.peek::<UnitAuditState, _>(|state| state.pending.len())
            .unwrap_or(0)
    }

    /// Drain the unit's buffer and hand each log to `write`, in order
    ///
    /// Stops at the first failure; the remaining entries are discarded with
    /// the buffer. Returns the number written.
    pub fn flush(
        &self,
        unit: &UnitOfWork,
        mut write: impl FnMut(PendingAuditLog) -> TrailResult<()>,
    ) -> TrailResult<usize> {
        let pending = unit.with_data::<UnitAuditState, _>(|state| std::mem::take(&mut state.pending));
        if pending.is_empty() {
            return Ok(0);
        }

        debug!(unit = %unit.id(), count = pending.len(), "flushing audit buffer");
        let mut written = 0;
        for log in pending {
            write(log)?;
            written += 1;
        }
        Ok(written)
    }
}

fn ambient_key(entity_type: &str) -> String {
    format!("{}{}", CRITERIA_KEY_PREFIX, entity_type)
}

/// Criteria selecting the row `data` describes
///
/// A row yields its primary-key values (or `None` when any is missing); a
/// bare scalar is taken as the primary key itself.
fn criteria_from_data(data: &Value, entity: &EntityDescriptor) -> Option<Criteria> {
    match data {
        Value::Object(row) => entity.key_values(row).map(|keys| Criteria::from_row(&keys)),
        Value::Null | Value::Array(_) => None,
        scalar => Some(Criteria::new().eq(entity.primary_column(), scalar.clone())),
    }
}
