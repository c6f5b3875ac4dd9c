//! Core data models for history-trail
//!
//! Identifiers, actions, host entity metadata, selection criteria, causal
//! context and the persisted audit record.

pub mod action;
pub mod context;
pub mod criteria;
pub mod entity;
pub mod ids;
pub mod record;

pub use action::ActionType;
pub use context::{EffectiveContext, PartialContext, UNKNOWN_CONTEXT_KEY};
pub use criteria::{compare_values, Criteria, Matcher};
pub use entity::{EntityDescriptor, Row};
pub use ids::{RecordId, UnitId};
pub use record::{AuditRecord, CapturedData};
