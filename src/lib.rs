//! history-trail - change-capture and audit-trail engine
//!
//! Hooks into a host persistence engine, records every create, update and
//! delete of tracked records as an attributable audit row, and answers
//! paginated queries over those rows.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `ambient`: thread-scoped request context store
//! - `audit`: the recording engine, queries and state reconstruction
//! - `config`: configuration and path management
//! - `error`: custom error types
//! - `models`: ids, actions, criteria, context and audit records
//! - `storage`: host interfaces, the in-memory engine and the JSONL log
//! - `cli` / `display`: the `trail` inspection tool
//!
//! # Example
//!
//! ```rust,ignore
//! use history_trail::audit::{History, PolicyRegistry};
//! use history_trail::config::Settings;
//! use history_trail::storage::MemoryDatabase;
//!
//! let db = MemoryDatabase::new();
//! let history = History::new(Settings::default(), PolicyRegistry::new());
//! db.subscribe(history.subscriber())?;
//! ```

pub mod ambient;
pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod storage;

pub use error::{TrailError, TrailResult};
