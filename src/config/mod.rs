//! Configuration module for history-trail
//!
//! - XDG-compliant path resolution
//! - Engine settings persistence

pub mod paths;
pub mod settings;

pub use paths::TrailPaths;
pub use settings::Settings;
