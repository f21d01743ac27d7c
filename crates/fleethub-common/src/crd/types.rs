//! Supporting types shared by the fleethub and open-cluster-management CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// A status condition as reported by the owning controller
///
/// Fields other than `type` and `status` are optional because these objects
/// are written by controllers outside fleethub.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., ManagedClusterConditionAvailable)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last transition time as written by the API server (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Create a condition with only type and status set
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            ..Default::default()
        }
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_parses_api_server_shape() {
        let c: Condition = serde_json::from_value(serde_json::json!({
            "type": "ManagedClusterConditionAvailable",
            "status": "Unknown",
            "reason": "ManagedClusterLeaseUpdateStopped",
            "lastTransitionTime": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(c.status, ConditionStatus::Unknown);
        assert_eq!(c.reason.as_deref(), Some("ManagedClusterLeaseUpdateStopped"));
        assert!(c.message.is_none());
    }

    #[test]
    fn test_missing_status_defaults_to_unknown() {
        let c: Condition = serde_json::from_value(serde_json::json!({"type": "X"})).unwrap();
        assert_eq!(c.status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_find_condition() {
        let conditions = vec![
            Condition::new("A", ConditionStatus::True),
            Condition::new("B", ConditionStatus::False),
        ];
        assert_eq!(find_condition(&conditions, "B").map(|c| c.status), Some(ConditionStatus::False));
        assert!(find_condition(&conditions, "C").is_none());
    }
}
