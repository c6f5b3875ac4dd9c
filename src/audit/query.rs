//! Audit query: filtering, ordering and pagination over the trail
//!
//! `FindAllOptions` is what callers pass; it is lowered to a `LogQuery` that
//! any `AuditLogStore` can evaluate. Stores without a query engine of their
//! own (the in-memory engine, the JSONL file) use `LogQuery::apply`.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{TrailError, TrailResult};
use crate::models::{compare_values, ActionType, Criteria, Matcher, RecordId, Row};
use crate::storage::AuditLogStore;

/// Default page size when the caller gives none
pub const DEFAULT_PAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Ordering of the result set; ties are broken by `id` in the same direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOrder {
    pub column: String,
    pub direction: SortDirection,
}

impl Default for LogOrder {
    fn default() -> Self {
        Self {
            column: "created_at".into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Store-level query over audit rows
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    /// OR of AND-groups; empty matches everything
    pub filters: Vec<Criteria>,
    pub order: LogOrder,
    pub skip: usize,
    pub take: usize,
}

impl LogQuery {
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|c| c.matches(row))
    }

    /// Evaluate the query over a full set of rows
    ///
    /// Returns the requested page and the total number of matches.
    pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> (Vec<Row>, u64) {
        let mut matched: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).collect();
        let total = matched.len() as u64;

        matched.sort_by(|a, b| {
            let primary = compare_column(a, b, &self.order.column);
            let ordering = primary.then_with(|| compare_column(a, b, "id"));
            match self.order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let page = matched.into_iter().skip(self.skip).take(self.take).collect();
        (page, total)
    }
}

fn compare_column(a: &Row, b: &Row, column: &str) -> Ordering {
    let null = Value::Null;
    let left = a.get(column).unwrap_or(&null);
    let right = b.get(column).unwrap_or(&null);
    compare_values(left, right).unwrap_or(Ordering::Equal)
}

/// Caller-facing query options
///
/// Semantic filters are merged into every native `conditions` group and
/// override overlapping columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAllOptions {
    pub entity_key: Option<String>,
    pub entity_id: Option<RecordId>,
    pub context_entity_key: Option<String>,
    pub context_entity_id: Option<RecordId>,
    pub actor_id: Option<RecordId>,
    pub action: Option<ActionType>,
    /// Inclusive lower bound on `created_at`
    pub from_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to_date: Option<DateTime<Utc>>,
    /// 1-based page; takes precedence over `skip`
    pub page: Option<usize>,
    /// Page size; takes precedence over `take`
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    /// Native filter groups, OR-ed together
    pub conditions: Vec<Criteria>,
    pub order: Option<LogOrder>,
}

impl FindAllOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entity(mut self, entity_key: impl Into<String>, entity_id: Option<RecordId>) -> Self {
        self.entity_key = Some(entity_key.into());
        self.entity_id = entity_id;
        self
    }

    #[must_use]
    pub fn context_entity(mut self, key: impl Into<String>, id: Option<RecordId>) -> Self {
        self.context_entity_key = Some(key.into());
        self.context_entity_id = id;
        self
    }

    #[must_use]
    pub fn actor(mut self, actor_id: impl Into<RecordId>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    #[must_use]
    pub fn action(mut self, action: ActionType) -> Self {
        self.action = Some(action);
        self
    }

    #[must_use]
    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }

    #[must_use]
    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn condition(mut self, group: Criteria) -> Self {
        self.conditions.push(group);
        self
    }

    fn semantic_criteria(&self) -> Criteria {
        let mut criteria = Criteria::new();
        let id_value = |id: &RecordId| id.to_value();

        if let Some(key) = &self.entity_key {
            criteria.set("entity_key", Matcher::Eq(Value::from(key.as_str())));
        }
        if let Some(id) = &self.entity_id {
            criteria.set("entity_id", Matcher::Eq(id_value(id)));
        }
        if let Some(key) = &self.context_entity_key {
            criteria.set("context_entity_key", Matcher::Eq(Value::from(key.as_str())));
        }
        if let Some(id) = &self.context_entity_id {
            criteria.set("context_entity_id", Matcher::Eq(id_value(id)));
        }
        if let Some(actor) = &self.actor_id {
            criteria.set("actor_id", Matcher::Eq(id_value(actor)));
        }
        if let Some(action) = self.action {
            criteria.set("action", Matcher::Eq(Value::from(action.as_str())));
        }

        let ts = |d: &DateTime<Utc>| Value::from(d.to_rfc3339());
        match (&self.from_date, &self.to_date) {
            (Some(from), Some(to)) => criteria.set("created_at", Matcher::Between(ts(from), ts(to))),
            (Some(from), None) => criteria.set("created_at", Matcher::Gte(ts(from))),
            (None, Some(to)) => criteria.set("created_at", Matcher::Lte(ts(to))),
            (None, None) => {}
        }

        criteria
    }

    /// Effective page size
    pub fn resolved_take(&self, default_limit: usize) -> usize {
        self.limit
            .filter(|l| *l > 0)
            .or(self.take.filter(|t| *t > 0))
            .unwrap_or(default_limit)
    }

    /// Lower these options to a store query
    pub fn to_query(&self, default_limit: usize) -> TrailResult<LogQuery> {
        if self.page == Some(0) {
            return Err(TrailError::Validation("page numbers start at 1".into()));
        }

        let take = self.resolved_take(default_limit);
        let skip = match self.page {
            Some(page) => (page - 1) * take,
            None => self.skip.unwrap_or(0),
        };

        let semantic = self.semantic_criteria();
        let filters = if self.conditions.is_empty() {
            if semantic.is_empty() {
                Vec::new()
            } else {
                vec![semantic]
            }
        } else {
            self.conditions
                .iter()
                .map(|group| group.merged_with(&semantic))
                .collect()
        };

        Ok(LogQuery {
            filters,
            order: self.order.clone().unwrap_or_default(),
            skip,
            take,
        })
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub total_pages: u64,
}

/// One page of audit records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindAllResult<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Run a paginated query and deserialize each row as `T`
pub fn find_all<T: DeserializeOwned>(
    store: &dyn AuditLogStore,
    options: &FindAllOptions,
    default_limit: usize,
) -> TrailResult<FindAllResult<T>> {
    let query = options.to_query(default_limit)?;
    let (rows, total) = store.find_logs(&query)?;
    debug!(total, returned = rows.len(), "audit query");

    let items = rows
        .into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)))
        .collect::<Result<Vec<T>, _>>()?;

    let limit = query.take;
    let page = options.page.unwrap_or(query.skip / limit.max(1) + 1);
    let total_pages = if limit == 0 {
        0
    } else {
        total.div_ceil(limit as u64)
    };

    Ok(FindAllResult {
        items,
        meta: PageMeta {
            total,
            page,
            limit,
            total_pages,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn rows() -> Vec<Row> {
        (1..=5)
            .map(|i| {
                row(json!({
                    "id": i,
                    "entity_key": if i % 2 == 0 { "task" } else { "project" },
                    "actor_id": i,
                    "created_at": format!("2024-01-0{}T00:00:00+00:00", i),
                }))
            })
            .collect()
    }

    #[test]
    fn test_default_order_newest_first() {
        let query = FindAllOptions::new().to_query(10).unwrap();
        let (page, total) = query.apply(rows());
        assert_eq!(total, 5);
        let ids: Vec<_> = page.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(5), json!(4), json!(3), json!(2), json!(1)]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let same_time: Vec<Row> = (1..=3)
            .map(|i| row(json!({"id": i, "created_at": "2024-01-01T00:00:00+00:00"})))
            .collect();
        let (page, _) = FindAllOptions::new().to_query(10).unwrap().apply(same_time);
        assert_eq!(page[0]["id"], json!(3));
        assert_eq!(page[2]["id"], json!(1));
    }

    #[test]
    fn test_semantic_filters_override_conditions() {
        let options = FindAllOptions::new()
            .entity("task", None)
            .condition(Criteria::new().eq("entity_key", "project").eq("actor_id", 2))
            .condition(Criteria::new().eq("actor_id", 4));

        let query = options.to_query(10).unwrap();
        assert_eq!(query.filters.len(), 2);
        assert_eq!(
            query.filters[0].get("entity_key"),
            Some(&Matcher::Eq(json!("task")))
        );

        let (page, total) = query.apply(rows());
        assert_eq!(total, 2);
        assert!(page.iter().all(|r| r["entity_key"] == json!("task")));
    }

    #[test]
    fn test_date_bounds_inclusive() {
        let from = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();

        let both = FindAllOptions::new().between(Some(from), Some(to));
        assert_eq!(both.to_query(10).unwrap().apply(rows()).1, 3);

        let from_only = FindAllOptions::new().between(Some(from), None);
        assert_eq!(from_only.to_query(10).unwrap().apply(rows()).1, 4);

        let to_only = FindAllOptions::new().between(None, Some(to));
        assert_eq!(to_only.to_query(10).unwrap().apply(rows()).1, 4);
    }

    #[test]
    fn test_take_and_skip_resolution() {
        let options = FindAllOptions {
            page: Some(3),
            limit: Some(4),
            skip: Some(100),
            take: Some(1),
            ..Default::default()
        };
        let query = options.to_query(10).unwrap();
        assert_eq!((query.skip, query.take), (8, 4));

        let raw = FindAllOptions {
            skip: Some(2),
            take: Some(0),
            ..Default::default()
        };
        let query = raw.to_query(7).unwrap();
        assert_eq!((query.skip, query.take), (2, 7));
    }

    #[test]
    fn test_page_zero_rejected() {
        let options = FindAllOptions::new().page(0, 10);
        assert!(matches!(
            options.to_query(10),
            Err(TrailError::Validation(_))
        ));
    }
}
