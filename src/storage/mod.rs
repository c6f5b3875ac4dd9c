//! Host persistence interfaces and bundled backends
//!
//! The audit engine never talks to a database directly. A host engine
//! implements `Persistence` (row lookup, entity metadata, units of work) and
//! `AuditLogStore` (where audit rows go), and emits `MutationHooks`.
//!
//! Two backends ship with the crate: an in-memory reference engine and an
//! append-only JSONL audit log.

pub mod audit_log;
pub mod hooks;
pub mod memory;
pub mod unit;

pub use audit_log::JsonlAuditLog;
pub use hooks::{InsertEvent, MutationHooks, OperationEvent, OperationKind, RemoveEvent, UpdateEvent};
pub use memory::{MemoryDatabase, Transaction};
pub use unit::UnitOfWork;

use crate::audit::query::LogQuery;
use crate::error::TrailResult;
use crate::models::{Criteria, EntityDescriptor, Row};

/// Where audit rows are written and read back
pub trait AuditLogStore {
    /// Persist one audit row; the store assigns `id` and `created_at`
    /// when missing and returns the row as written
    fn append_log(&self, row: Row) -> TrailResult<Row>;

    /// Evaluate a query; returns the requested page and the total match count
    fn find_logs(&self, query: &LogQuery) -> TrailResult<(Vec<Row>, u64)>;
}

/// Read access a host engine gives the audit engine
pub trait Persistence: AuditLogStore {
    /// Metadata for an entity type the host knows
    fn describe(&self, entity_type: &str) -> Option<EntityDescriptor>;

    /// Rows of `entity` matching `criteria`
    ///
    /// `select` restricts the returned columns; `None` returns them all.
    fn find(
        &self,
        entity: &EntityDescriptor,
        criteria: &Criteria,
        select: Option<&[String]>,
    ) -> TrailResult<Vec<Row>>;

    /// The unit of work this handle runs in, if any
    fn unit(&self) -> Option<&UnitOfWork> {
        None
    }
}
