//! Display formatting for terminal output
//!
//! Plain-text tables and detail views for audit records.

pub mod record;

pub use record::{format_record_details, format_record_list, format_state, format_unified};
