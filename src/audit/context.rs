//! Context resolution and ambient request helpers
//!
//! Three sources can contribute causal context to a record: a manual
//! override passed with the change, the snapshot sealed when a criteria-based
//! operation started, and the ambient scope of the current request. They are
//! merged field by field in that order of priority.

use serde_json::{Map, Value};

use crate::ambient;
use crate::models::PartialContext;

/// Ambient key holding the request's `PartialContext`
pub const CONTEXT_KEY: &str = "history.context";

/// Ambient key that suppresses recording while set to `true`
pub const IGNORE_KEY: &str = "history.ignore";

/// Merge the three context sources; manual > sealed > ambient
pub fn resolve(
    manual: Option<PartialContext>,
    sealed: Option<PartialContext>,
    ambient: Option<PartialContext>,
) -> PartialContext {
    manual
        .unwrap_or_default()
        .over(sealed.unwrap_or_default().over(ambient.unwrap_or_default()))
}

/// Context stored in the current ambient scope, if any
pub fn ambient_context() -> Option<PartialContext> {
    ambient::get_as(CONTEXT_KEY)
}

/// Run `f` inside a new ambient scope carrying `context`
///
/// Inner scopes inherit the enclosing context and override it field by field.
pub fn with_context<R>(context: PartialContext, f: impl FnOnce() -> R) -> R {
    let merged = match ambient_context() {
        Some(outer) => context.over(outer),
        None => context,
    };

    let mut data = Map::new();
    if let Ok(value) = serde_json::to_value(&merged) {
        data.insert(CONTEXT_KEY.to_string(), value);
    }
    ambient::run_with(data, f)
}

/// Merge `extra` into the ambient context's metadata
///
/// Later values win per key. Returns `false` (a silent no-op) when no ambient
/// scope is active.
pub fn add_metadata(extra: Map<String, Value>) -> bool {
    if !ambient::is_active() {
        return false;
    }

    let mut context = ambient_context().unwrap_or_default();
    context.metadata.get_or_insert_with(Map::new).extend(extra);
    ambient::set_as(CONTEXT_KEY, &context)
}

/// Run `f` with recording suppressed for every change it makes
pub fn ignore<R>(f: impl FnOnce() -> R) -> R {
    let mut data = Map::new();
    data.insert(IGNORE_KEY.to_string(), Value::Bool(true));
    ambient::run_with(data, f)
}

/// Check whether recording is suppressed in the current scope
pub fn is_ignored() -> bool {
    matches!(ambient::get(IGNORE_KEY), Some(Value::Bool(true)))
}
