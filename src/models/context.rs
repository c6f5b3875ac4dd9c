//! Causal context attached to every audit record
//!
//! `PartialContext` is what each source (manual override, sealed snapshot,
//! ambient request scope) can contribute; `EffectiveContext` is the merged
//! result with the actor invariant enforced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::RecordId;
use crate::error::{TrailError, TrailResult};

/// Context key used when no source names the parent context
pub const UNKNOWN_CONTEXT_KEY: &str = "UNKNOWN";

/// Context fields as contributed by a single source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_entity_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_entity_id: Option<RecordId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<RecordId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    /// Extra columns to persist with the record (e.g. `user_agent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl PartialContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<RecordId>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    #[must_use]
    pub fn with_context_entity(
        mut self,
        key: impl Into<String>,
        id: Option<RecordId>,
    ) -> Self {
        self.context_entity_key = Some(key.into());
        self.context_entity_id = id;
        self
    }

    #[must_use]
    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Fill every field still missing here from `lower`
    ///
    /// Field by field: a value present in `self` is never replaced, a value
    /// present only in `lower` is kept. Metadata maps merge key by key with
    /// `self` winning.
    #[must_use]
    pub fn over(self, lower: PartialContext) -> PartialContext {
        let metadata = match (lower.metadata, self.metadata) {
            (Some(mut base), Some(top)) => {
                base.extend(top);
                Some(base)
            }
            (base, top) => top.or(base),
        };

        PartialContext {
            context_entity_key: self.context_entity_key.or(lower.context_entity_key),
            context_entity_id: self.context_entity_id.or(lower.context_entity_id),
            actor_id: self.actor_id.or(lower.actor_id),
            request_id: self.request_id.or(lower.request_id),
            client_ip: self.client_ip.or(lower.client_ip),
            metadata,
        }
    }

    /// Enforce the actor invariant
    ///
    /// `entity_key` names the audited entity in the violation error.
    pub fn into_effective(self, entity_key: &str) -> TrailResult<EffectiveContext> {
        let actor_id = self.actor_id.ok_or_else(|| TrailError::MissingActor {
            entity_key: entity_key.to_string(),
        })?;

        Ok(EffectiveContext {
            context_entity_key: self
                .context_entity_key
                .unwrap_or_else(|| UNKNOWN_CONTEXT_KEY.to_string()),
            context_entity_id: self.context_entity_id,
            actor_id,
            request_id: self.request_id,
            client_ip: self.client_ip,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

/// Fully resolved context for one audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveContext {
    pub context_entity_key: String,
    pub context_entity_id: Option<RecordId>,
    pub actor_id: RecordId,
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
    pub metadata: Map<String, Value>,
}
