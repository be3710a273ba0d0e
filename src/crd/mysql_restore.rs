//! MySqlRestore Custom Resource Definition

use std::fmt;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{OPERATOR_VERSION, OPERATOR_VERSION_LABEL};

/// MySqlRestore resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "mysql.oso.sh",
    version = "v1alpha1",
    kind = "MySqlRestore",
    plural = "mysqlrestores",
    singular = "mysqlrestore",
    shortname = "myr",
    namespaced,
    status = "MySqlRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.cluster.name"}"#,
    printcolumn = r#"{"name": "Backup", "type": "string", "jsonPath": ".spec.backup.name"}"#,
    printcolumn = r#"{"name": "Member", "type": "string", "jsonPath": ".spec.scheduledMember"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MySqlRestoreSpec {
    /// Cluster to restore into
    pub cluster: LocalObjectRef,

    /// Backup to restore from
    pub backup: LocalObjectRef,

    /// Pod the restore was scheduled on (set by the operator)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheduled_member: String,
}

/// Reference to a resource in the same namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectRef {
    /// Resource name
    #[serde(default)]
    pub name: String,
}

impl LocalObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// MySqlRestore status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MySqlRestoreStatus {
    /// Status conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RestoreCondition>,
}

/// Condition types a restore can carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum RestoreConditionType {
    /// Restore has been assigned to a cluster member
    Scheduled,
    /// Restore failed
    Failed,
}

impl fmt::Display for RestoreConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreConditionType::Scheduled => f.write_str("Scheduled"),
            RestoreConditionType::Failed => f.write_str("Failed"),
        }
    }
}

/// Condition status values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => f.write_str("True"),
            ConditionStatus::False => f.write_str("False"),
            ConditionStatus::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: RestoreConditionType,

    /// Status (True, False, Unknown)
    pub status: ConditionStatus,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl RestoreCondition {
    /// Build a condition stamped with the current time
    pub fn new(type_: RestoreConditionType, status: ConditionStatus) -> Self {
        Self {
            type_,
            status,
            last_transition_time: Utc::now(),
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl MySqlRestore {
    /// Condition of the given type, if present
    pub fn condition(&self, type_: RestoreConditionType) -> Option<&RestoreCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }

    /// Whether the condition of the given type is present with status True
    pub fn has_condition_true(&self, type_: RestoreConditionType) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Already assigned to a member by a previous reconciliation
    pub fn is_scheduled(&self) -> bool {
        self.has_condition_true(RestoreConditionType::Scheduled)
            && !self.spec.scheduled_member.is_empty()
    }

    /// Upsert a condition by type.
    ///
    /// The transition time of an existing condition is kept unless its
    /// status changes.
    pub fn set_condition(&mut self, condition: RestoreCondition) {
        let status = self.status.get_or_insert_with(Default::default);
        match status
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => {
                let last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time
                } else {
                    condition.last_transition_time
                };
                *existing = RestoreCondition {
                    last_transition_time,
                    ..condition
                };
            }
            None => status.conditions.push(condition),
        }
    }

    /// Apply default values, including the operator version label
    pub fn ensure_defaults(mut self) -> Self {
        self.metadata
            .labels
            .get_or_insert_with(Default::default)
            .entry(OPERATOR_VERSION_LABEL.to_string())
            .or_insert_with(|| OPERATOR_VERSION.to_string());
        self
    }
}
