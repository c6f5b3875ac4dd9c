//! Mutation hooks a host persistence engine emits
//!
//! Operation-level hooks bracket a criteria-based call (`update`, `delete`,
//! `insert`, `upsert`); the host must call `after_operation` on every exit
//! path. Row-level hooks fire around the individual changes.

use serde_json::Value;

use super::Persistence;
use crate::error::TrailResult;
use crate::models::{Criteria, EntityDescriptor, Row};

/// Criteria-based call shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Upsert,
}

/// A criteria-based operation about to run (or just finished)
pub struct OperationEvent<'a> {
    pub kind: OperationKind,
    pub entity: &'a EntityDescriptor,
    /// Selection criteria; `None` when the affected ids are not known yet
    pub criteria: Option<&'a Criteria>,
    pub manager: &'a dyn Persistence,
}

/// A row was inserted
pub struct InsertEvent<'a> {
    pub entity: &'a EntityDescriptor,
    /// The inserted row, generated keys included
    pub row: &'a Row,
    pub manager: &'a dyn Persistence,
}

/// Rows are being (or were) updated
pub struct UpdateEvent<'a> {
    pub entity: &'a EntityDescriptor,
    /// New values; partial for criteria-based updates
    pub row: Option<&'a Row>,
    /// Complete stored state when the host already loaded it
    pub database_row: Option<&'a Row>,
    pub manager: &'a dyn Persistence,
}

/// Rows are being (or were) removed
pub struct RemoveEvent<'a> {
    pub entity: &'a EntityDescriptor,
    pub row: Option<&'a Row>,
    /// Complete stored state when the host already loaded it
    pub database_row: Option<&'a Row>,
    /// Primary-key value, when removing a single known record
    pub entity_id: Option<&'a Value>,
    pub manager: &'a dyn Persistence,
}

/// Callbacks registered with a host engine
///
/// Every method defaults to a no-op.
pub trait MutationHooks: Send + Sync {
    fn before_operation(&self, _event: &OperationEvent<'_>) {}

    fn after_operation(&self, _event: &OperationEvent<'_>) {}

    fn after_insert(&self, _event: &InsertEvent<'_>) -> TrailResult<()> {
        Ok(())
    }

    fn before_update(&self, _event: &UpdateEvent<'_>) -> TrailResult<()> {
        Ok(())
    }

    fn after_update(&self, _event: &UpdateEvent<'_>) -> TrailResult<()> {
        Ok(())
    }

    fn before_remove(&self, _event: &RemoveEvent<'_>) -> TrailResult<()> {
        Ok(())
    }

    fn after_remove(&self, _event: &RemoveEvent<'_>) -> TrailResult<()> {
        Ok(())
    }
}
