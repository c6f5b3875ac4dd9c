//! CLI command handlers
//!
//! Bridges clap argument parsing with the audit query and display layers.

pub mod history;

pub use history::{
    handle_config_command, handle_list_command, handle_show_command, open_log, ListArgs,
    ShowArgs, ShowView,
};
