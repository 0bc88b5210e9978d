//! # OsbInstance Status
//!
//! Status types for tracking the last requested operation and its conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the OsbInstance resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsbInstanceStatus {
    /// Conditions represent the latest available observations.
    /// Ordered, never truncated, matched by `type` on update.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Provisioning action that produced the current conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation_type: Option<OperationType>,
    /// Error reported by the provisioning backend for the last operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Condition type. Each resource carries at most one condition per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ConditionType {
    InProgress,
    Ready,
    Error,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::InProgress => "InProgress",
            ConditionType::Ready => "Ready",
            ConditionType::Error => "Error",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition status (True, False, Unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Provisioning operation requested for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Create => "Create",
            OperationType::Update => "Update",
            OperationType::Delete => "Delete",
        }
    }

    /// Lowercase form used as the broker operation token
    pub fn token(self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status of the condition
    pub status: ConditionStatus,
    /// Machine readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human readable details about the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last time any of status, reason or message changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
    /// Last time the status changed (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(r#type: ConditionType, status: ConditionStatus) -> Self {
        Self {
            r#type,
            status,
            reason: None,
            message: None,
            last_update_time: None,
            last_transition_time: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.r#type, self.status.as_str())?;
        if let Some(reason) = &self.reason {
            write!(f, " {reason:?}")?;
        }
        if let Some(message) = &self.message {
            write!(f, " {message:?}")?;
        }
        Ok(())
    }
}

impl OsbInstanceStatus {
    /// Look up the condition of the given type
    pub fn condition(&self, r#type: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    /// Merge a condition into the status.
    ///
    /// Conditions of other types are preserved. `lastTransitionTime` moves only when
    /// the status flips; `lastUpdateTime` moves whenever status, reason or message changes.
    /// Returns true if the condition was added or any of its fields changed.
    pub fn update_condition(&mut self, condition: Condition) -> bool {
        let now = chrono::Utc::now().to_rfc3339();
        let mut condition = condition;

        let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        else {
            condition.last_transition_time = Some(now.clone());
            condition.last_update_time = Some(now);
            self.conditions.push(condition);
            return true;
        };

        let status_changed = existing.status != condition.status;
        let changed = status_changed
            || existing.reason != condition.reason
            || existing.message != condition.message;
        if !changed {
            return false;
        }

        condition.last_transition_time = if status_changed {
            Some(now.clone())
        } else {
            existing.last_transition_time.clone()
        };
        condition.last_update_time = Some(now);
        *existing = condition;
        true
    }
}

impl fmt::Display for OsbInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{condition}")?;
        }
        f.write_str("]")
    }
}
