//! Selection criteria
//!
//! A `Criteria` is the engine's equivalent of a WHERE predicate: a
//! conjunction of per-column matchers. It locates the rows a criteria-based
//! mutation affects, and filters audit records on the query path.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::Row;

/// Condition on a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum Matcher {
    /// Column equals the value
    Eq(Value),
    /// Column equals one of the values
    In(Vec<Value>),
    /// Column lies in the inclusive range
    Between(Value, Value),
    /// Column is greater than or equal to the value
    Gte(Value),
    /// Column is less than or equal to the value
    Lte(Value),
}

impl Matcher {
    /// Check whether `actual` satisfies this matcher
    ///
    /// A missing column behaves like `null`.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            Matcher::Eq(expected) => actual == expected,
            Matcher::In(values) => values.iter().any(|v| v == actual),
            Matcher::Between(low, high) => {
                matches!(
                    compare_values(actual, low),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare_values(actual, high),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            Matcher::Gte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Matcher::Lte(bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

/// Conjunction of column matchers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria(BTreeMap<String, Matcher>);

impl Criteria {
    /// Empty criteria (matches every row)
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality criteria built from key/value pairs
    pub fn from_row(row: &Row) -> Self {
        Self(
            row.iter()
                .map(|(k, v)| (k.clone(), Matcher::Eq(v.clone())))
                .collect(),
        )
    }

    /// Add an equality condition
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), Matcher::Eq(value.into()));
        self
    }

    /// Add a membership condition
    pub fn any_of<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0.insert(column.into(), Matcher::In(values));
        self
    }

    /// Add or replace the matcher for a column
    pub fn set(&mut self, column: impl Into<String>, matcher: Matcher) {
        self.0.insert(column.into(), matcher);
    }

    /// Matcher for a column, if any
    pub fn get(&self, column: &str) -> Option<&Matcher> {
        self.0.get(column)
    }

    /// Overlay `other` on top of `self`; `other` wins on shared columns
    pub fn merged_with(&self, other: &Criteria) -> Criteria {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        Criteria(merged)
    }

    /// Check whether every condition holds for `row`
    pub fn matches(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(column, matcher)| matcher.matches(row.get(column)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(column, matcher)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Matcher)> {
        self.0.iter()
    }
}

/// Total-ish ordering over JSON scalars
///
/// Numbers compare numerically, strings that both parse as RFC 3339
/// timestamps compare chronologically, other strings lexically. `null`
/// sorts first. Values of different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => {
            match (
                x.parse::<DateTime<Utc>>(),
                y.parse::<DateTime<Utc>>(),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_eq_and_in() {
        let criteria = Criteria::new().eq("status", "open").any_of("id", [1, 2]);
        assert!(criteria.matches(&row(json!({"id": 2, "status": "open"}))));
        assert!(!criteria.matches(&row(json!({"id": 3, "status": "open"}))));
        assert!(!criteria.matches(&row(json!({"id": 1, "status": "closed"}))));
    }

    #[test]
    fn test_empty_matches_everything() {
        assert!(Criteria::new().matches(&row(json!({"id": 1}))));
    }

    #[test]
    fn test_missing_column_is_null() {
        let criteria = Criteria::new().eq("deleted_at", Value::Null);
        assert!(criteria.matches(&row(json!({"id": 1}))));
    }

    #[test]
    fn test_timestamp_range() {
        let mut criteria = Criteria::new();
        criteria.set(
            "created_at",
            Matcher::Between(
                json!("2025-01-01T00:00:00Z"),
                json!("2025-01-31T23:59:59Z"),
            ),
        );
        assert!(criteria.matches(&row(json!({"created_at": "2025-01-15T12:00:00+00:00"}))));
        assert!(criteria.matches(&row(json!({"created_at": "2025-01-01T00:00:00Z"}))));
        assert!(!criteria.matches(&row(json!({"created_at": "2025-02-01T00:00:00Z"}))));
    }

    #[test]
    fn test_one_sided_bounds() {
        let gte = Matcher::Gte(json!(10));
        assert!(gte.matches(Some(&json!(10))));
        assert!(!gte.matches(Some(&json!(9))));
        let lte = Matcher::Lte(json!(10));
        assert!(lte.matches(Some(&json!(3))));
        assert!(!lte.matches(Some(&json!("ten"))));
    }

    #[test]
    fn test_merged_with_overrides() {
        let base = Criteria::new().eq("a", 1).eq("b", 2);
        let merged = base.merged_with(&Criteria::new().eq("b", 3));
        assert_eq!(merged.get("a"), Some(&Matcher::Eq(json!(1))));
        assert_eq!(merged.get("b"), Some(&Matcher::Eq(json!(3))));
    }

    #[test]
    fn test_serialization_shape() {
        let criteria = Criteria::new().any_of("id", [1, 2]);
        let json = serde_json::to_value(&criteria).unwrap();
        assert_eq!(json, json!({"id": {"op": "in", "value": [1, 2]}}));
        let back: Criteria = serde_json::from_value(json).unwrap();
        assert_eq!(back, criteria);
    }
}
