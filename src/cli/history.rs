//! Audit log CLI commands
//!
//! Lists and reconstructs records stored in a JSONL audit log.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, ValueEnum};

use crate::audit::{
    find_all, map_to_entity, map_to_unified, FindAllOptions, FindAllResult, MapToEntityOptions,
    Side,
};
use crate::config::{Settings, TrailPaths};
use crate::display::{format_record_details, format_record_list, format_state, format_unified};
use crate::error::{TrailError, TrailResult};
use crate::models::{ActionType, AuditRecord, RecordId};
use crate::storage::JsonlAuditLog;

/// Filters for `trail list`
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Entity key (e.g. "task")
    #[arg(short = 'e', long)]
    pub entity_key: Option<String>,
    /// Entity id
    #[arg(long)]
    pub entity_id: Option<RecordId>,
    /// Context entity key (e.g. "project")
    #[arg(long = "context-key")]
    pub context_key: Option<String>,
    /// Context entity id
    #[arg(long = "context-id")]
    pub context_id: Option<RecordId>,
    /// Actor id
    #[arg(short, long)]
    pub actor: Option<RecordId>,
    /// Action (create, update, delete)
    #[arg(long)]
    pub action: Option<ActionType>,
    /// Earliest timestamp (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub from: Option<String>,
    /// Latest timestamp (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub to: Option<String>,
    /// Page number, starting at 1
    #[arg(short, long)]
    pub page: Option<usize>,
    /// Records per page
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// What `trail show` prints below the record header
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShowView {
    /// Old and new state side by side
    #[default]
    Unified,
    /// State after the change
    New,
    /// State before the change
    Old,
    /// The stored row as JSON
    Raw,
}

/// Arguments for `trail show`
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Audit record id
    pub id: u64,
    /// Content view
    #[arg(short, long, value_enum, default_value_t = ShowView::Unified)]
    pub view: ShowView,
    /// Keep escaped dot-paths instead of nesting (old/new views)
    #[arg(long)]
    pub flat: bool,
}

/// Parse a date bound; a bare date means the start (or end) of that day
fn parse_bound(input: &str, end_of_day: bool) -> TrailResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        TrailError::Validation(format!(
            "Invalid date: '{}'. Use YYYY-MM-DD or an RFC 3339 timestamp",
            input
        ))
    })?;

    let time = if end_of_day {
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| TrailError::Validation(format!("Invalid date: '{}'", input)))?;

    Ok(date.and_time(time).and_utc())
}

impl ListArgs {
    /// Translate the flags into query options
    pub fn to_options(&self) -> TrailResult<FindAllOptions> {
        let from = self.from.as_deref().map(|s| parse_bound(s, false)).transpose()?;
        let to = self.to.as_deref().map(|s| parse_bound(s, true)).transpose()?;

        let options = FindAllOptions {
            entity_key: self.entity_key.clone(),
            entity_id: self.entity_id.clone(),
            context_entity_key: self.context_key.clone(),
            context_entity_id: self.context_id.clone(),
            actor_id: self.actor.clone(),
            action: self.action,
            from_date: from,
            to_date: to,
            page: Some(self.page.unwrap_or(1)),
            limit: self.limit,
            ..FindAllOptions::default()
        };
        Ok(options)
    }
}

/// Resolve the audit log from an explicit path or the settings
pub fn open_log(
    explicit: Option<std::path::PathBuf>,
    paths: &TrailPaths,
    settings: &Settings,
) -> JsonlAuditLog {
    JsonlAuditLog::new(explicit.unwrap_or_else(|| settings.audit_log_path(paths)))
}

/// Handle `trail list`
pub fn handle_list_command(
    log: &JsonlAuditLog,
    settings: &Settings,
    args: &ListArgs,
) -> TrailResult<()> {
    let options = args.to_options()?;
    let result: FindAllResult<AuditRecord> = find_all(log, &options, settings.default_page_limit)?;
    print!("{}", format_record_list(&result.items, &result.meta));
    Ok(())
}

/// Handle `trail show`
pub fn handle_show_command(log: &JsonlAuditLog, args: &ShowArgs) -> TrailResult<()> {
    let record = log
        .get(args.id)?
        .ok_or_else(|| TrailError::record_not_found(args.id.to_string()))?;

    print!("{}", format_record_details(&record));
    println!();

    match args.view {
        ShowView::Unified => print!("{}", format_unified(&map_to_unified(&record))),
        ShowView::New | ShowView::Old => {
            let options = MapToEntityOptions {
                side: if args.view == ShowView::Old {
                    Side::Old
                } else {
                    Side::New
                },
                unflatten: !args.flat,
            };
            print!("{}", format_state(&map_to_entity(&record, &options)));
        }
        ShowView::Raw => println!("{}", serde_json::to_string_pretty(&record)?),
    }

    Ok(())
}

/// Handle `trail config`
pub fn handle_config_command(paths: &TrailPaths, settings: &Settings, log: &JsonlAuditLog) {
    println!("history-trail Configuration");
    println!("===========================");
    println!("Base directory:   {}", paths.base_dir().display());
    println!("Settings file:    {}", paths.settings_file().display());
    println!("Audit log:        {}", log.path().display());
    println!();
    println!("Settings:");
    println!("  Ignored keys:       {}", settings.ignored_keys.join(", "));
    println!("  Soft-delete field:  {}", settings.soft_delete_field);
    println!("  Intercept criteria: {}", settings.intercept_criteria);
    println!("  Default page limit: {}", settings.default_page_limit);
}
