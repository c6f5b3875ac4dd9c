//! Ambient (request-scoped) key/value store
//!
//! Carries context across an arbitrary call chain without threading it
//! through every signature. Scopes live on a per-thread stack: entering a
//! scope copies the enclosing scope's data, so writes inside never leak to
//! the parent or to other threads.
//!
//! The store is synchronous. Code that moves work to another thread must
//! enter a new scope there; nothing is inherited across threads.

use std::cell::RefCell;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

thread_local! {
    static SCOPES: RefCell<Vec<Map<String, Value>>> = RefCell::new(Vec::new());
}

/// Pops the scope it pushed, on every exit path
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

/// Check whether the current thread is inside a scope
pub fn is_active() -> bool {
    SCOPES.with(|scopes| !scopes.borrow().is_empty())
}

/// Read a value from the innermost scope
pub fn get(key: &str) -> Option<Value> {
    SCOPES.with(|scopes| scopes.borrow().last().and_then(|s| s.get(key).cloned()))
}

/// Read and deserialize a value from the innermost scope
///
/// A value that does not deserialize as `T` reads as `None`.
pub fn get_as<T: DeserializeOwned>(key: &str) -> Option<T> {
    get(key).and_then(|v| serde_json::from_value(v).ok())
}

/// Write a value into the innermost scope
///
/// Returns `false` (and stores nothing) when no scope is active.
pub fn set(key: &str, value: Value) -> bool {
    SCOPES.with(|scopes| match scopes.borrow_mut().last_mut() {
        Some(scope) => {
            scope.insert(key.to_string(), value);
            true
        }
        None => false,
    })
}

/// Serialize and write a value into the innermost scope
pub fn set_as<T: Serialize>(key: &str, value: &T) -> bool {
    match serde_json::to_value(value) {
        Ok(v) => set(key, v),
        Err(_) => false,
    }
}

/// Remove a key from the innermost scope
pub fn remove(key: &str) {
    SCOPES.with(|scopes| {
        if let Some(scope) = scopes.borrow_mut().last_mut() {
            scope.remove(key);
        }
    });
}

/// Run `f` inside a fresh scope that starts as a copy of the current one
pub fn run<R>(f: impl FnOnce() -> R) -> R {
    run_with(Map::new(), f)
}

/// Run `f` inside a fresh scope: a copy of the current one overlaid with `data`
pub fn run_with<R>(data: Map<String, Value>, f: impl FnOnce() -> R) -> R {
    SCOPES.with(|scopes| {
        let mut scopes = scopes.borrow_mut();
        let mut scope = scopes.last().cloned().unwrap_or_default();
        scope.extend(data);
        scopes.push(scope);
    });
    let _guard = ScopeGuard;
    f()
}
