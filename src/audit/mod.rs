//! Audit trail engine
//!
//! Records every create, update and delete of tracked entity types as one
//! audit row each, attributed to an actor and a parent context, and written
//! inside the same unit of work as the change itself.
//!
//! # Architecture
//!
//! - `History`: facade holding settings and field policies; hands out the
//!   hook subscriber and runs queries.
//! - `HistorySubscriber`: turns host mutation hooks into pending logs.
//! - `CriteriaCarrier`: carries the selection criteria of a bulk operation
//!   to the hooks that fire inside it.
//! - `HistoryRecorder`: builds the row (context, payload filter, diff) and
//!   writes it through the host's `AuditLogStore`.
//! - `query` and `mapper`: paginated lookup and state reconstruction.
//!
//! # Example
//!
//! ```rust,ignore
//! use history_trail::audit::{History, PolicyRegistry};
//! use history_trail::config::Settings;
//!
//! let mut policies = PolicyRegistry::new();
//! policies.track("Task", "task").exclude("Task", "secret");
//!
//! let history = History::new(Settings::default(), policies);
//! db.subscribe(history.subscriber())?;
//!
//! let ctx = PartialContext::new().with_actor(7);
//! history.with_context(ctx, || db.update("Task", &criteria, changes))?;
//! ```

pub mod carrier;
pub mod context;
pub mod diff;
pub mod history;
pub mod mapper;
pub mod path;
pub mod policy;
pub mod query;
pub mod recorder;
pub mod subscriber;

pub use carrier::{CriteriaCarrier, PendingAuditLog, SealedContext};
pub use diff::{diff_maps, DiffMap, FieldChange};
pub use history::{History, Mutation};
pub use mapper::{
    map_to_entity, map_to_entity_as, map_to_unified, HistoryLogLike, MapToEntityOptions, Side,
    UnifiedContent,
};
pub use policy::{FieldPolicy, PolicyRegistry, TrackerOptions};
pub use query::{
    find_all, FindAllOptions, FindAllResult, LogOrder, LogQuery, PageMeta, SortDirection,
    DEFAULT_PAGE_LIMIT,
};
pub use recorder::{HistoryRecorder, LogRequest, RecordMapper};
pub use subscriber::{AuditViolation, HistorySubscriber};
