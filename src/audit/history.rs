//! Public facade of the audit engine
//!
//! ```ignore
//! let mut policies = PolicyRegistry::new();
//! policies.track("Task", "task").exclude("Task", "secret");
//! let history = History::new(Settings::default(), policies);
//! db.subscribe(history.subscriber())?;
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::context;
use super::mapper::{self, HistoryLogLike, MapToEntityOptions, UnifiedContent};
use super::policy::PolicyRegistry;
use super::query::{self, FindAllOptions, FindAllResult};
use super::recorder::{HistoryRecorder, LogRequest, RecordMapper};
use super::subscriber::HistorySubscriber;
use crate::config::Settings;
use crate::error::{TrailError, TrailResult};
use crate::models::{ActionType, PartialContext, Row};
use crate::storage::{AuditLogStore, Persistence};

/// A change recorded by hand rather than through hooks
#[derive(Debug, Clone)]
pub struct Mutation {
    pub action: ActionType,
    pub entity_type: String,
    pub old_state: Option<Row>,
    pub new_state: Option<Row>,
    pub context: Option<PartialContext>,
}

impl Mutation {
    pub fn new(action: ActionType, entity_type: impl Into<String>) -> Self {
        Self {
            action,
            entity_type: entity_type.into(),
            old_state: None,
            new_state: None,
            context: None,
        }
    }

    #[must_use]
    pub fn old_state(mut self, state: Row) -> Self {
        self.old_state = Some(state);
        self
    }

    #[must_use]
    pub fn new_state(mut self, state: Row) -> Self {
        self.new_state = Some(state);
        self
    }

    #[must_use]
    pub fn context(mut self, context: PartialContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Entry point: recording, querying and reconstruction
pub struct History {
    settings: Settings,
    policies: Arc<PolicyRegistry>,
    recorder: Arc<HistoryRecorder>,
}

impl History {
    pub fn new(settings: Settings, policies: PolicyRegistry) -> Self {
        let policies = Arc::new(policies);
        let recorder = Arc::new(HistoryRecorder::new(&settings, policies.clone()));
        Self {
            settings,
            policies,
            recorder,
        }
    }

    /// Write audit rows in a custom shape
    ///
    /// Subscribers created before this call keep the previous shape.
    #[must_use]
    pub fn with_mapper(mut self, mapper: RecordMapper) -> Self {
        self.recorder = Arc::new(
            HistoryRecorder::new(&self.settings, self.policies.clone()).with_mapper(mapper),
        );
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Hooks to register with the host engine
    pub fn subscriber(&self) -> Arc<HistorySubscriber> {
        Arc::new(HistorySubscriber::new(
            &self.settings,
            self.policies.clone(),
            self.recorder.clone(),
        ))
    }

    /// Record one change explicitly
    ///
    /// Untracked types are recorded under their type name. Returns the written
    /// row, or `None` when the change was skipped.
    pub fn record_mutation(
        &self,
        manager: &dyn Persistence,
        mutation: Mutation,
    ) -> TrailResult<Option<Row>> {
        let entity = manager
            .describe(&mutation.entity_type)
            .ok_or_else(|| TrailError::unknown_entity(&mutation.entity_type))?;
        let entity_key = self
            .policies
            .tracker(&entity.name)
            .map(|t| t.entity_key.clone())
            .unwrap_or_else(|| entity.name.clone());

        let request = LogRequest {
            action: mutation.action,
            entity: &entity,
            entity_key: &entity_key,
            old_state: mutation.old_state.as_ref(),
            new_state: mutation.new_state.as_ref(),
            context: mutation.context,
        };
        self.recorder.save_log(&request, manager)
    }

    /// Paginated audit query
    pub fn find_all<T: DeserializeOwned>(
        &self,
        store: &dyn AuditLogStore,
        options: &FindAllOptions,
    ) -> TrailResult<FindAllResult<T>> {
        query::find_all(store, options, self.settings.default_page_limit)
    }

    pub fn map_to_entity(&self, log: &impl HistoryLogLike, options: &MapToEntityOptions) -> Map<String, Value> {
        mapper::map_to_entity(log, options)
    }

    pub fn map_to_unified(&self, log: &impl HistoryLogLike) -> UnifiedContent {
        mapper::map_to_unified(log)
    }

    /// Run `f` without recording any change it makes
    pub fn ignore<R>(&self, f: impl FnOnce() -> R) -> R {
        context::ignore(f)
    }

    /// Attach extra columns to every later record in the current scope
    ///
    /// Returns `false` when no ambient scope is active.
    pub fn add_metadata(&self, metadata: Map<String, Value>) -> bool {
        context::add_metadata(metadata)
    }

    /// Run `f` with `context` as the ambient request context
    pub fn with_context<R>(&self, context: PartialContext, f: impl FnOnce() -> R) -> R {
        context::with_context(context, f)
    }
}
