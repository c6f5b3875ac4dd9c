//! Kind of change recorded in the trail

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Types of change that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    /// Record was created
    Create,
    /// Record was updated
    Update,
    /// Record was removed or soft-deleted
    Delete,
}

impl ActionType {
    /// The persisted column value
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(ActionType::Create),
            "UPDATE" => Ok(ActionType::Update),
            "DELETE" => Ok(ActionType::Delete),
            _ => Err(format!(
                "Invalid action: '{}'. Valid actions: create, update, delete",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(ActionType::Create.to_string(), "CREATE");
        assert_eq!(ActionType::Update.to_string(), "UPDATE");
        assert_eq!(ActionType::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("update".parse::<ActionType>().unwrap(), ActionType::Update);
        assert_eq!("DELETE".parse::<ActionType>().unwrap(), ActionType::Delete);
        assert!("upsert".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_string(&ActionType::Create).unwrap();
        assert_eq!(json, "\"CREATE\"");
    }
}
