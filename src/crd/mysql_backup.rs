//! MySqlBackup Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::LocalObjectRef;

/// MySqlBackup resource specification
///
/// Restores reference a backup by name; only its existence is inspected.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "mysql.oso.sh",
    version = "v1alpha1",
    kind = "MySqlBackup",
    plural = "mysqlbackups",
    singular = "mysqlbackup",
    shortname = "myb",
    namespaced,
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.cluster.name"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MySqlBackupSpec {
    /// Cluster the backup was taken from
    #[serde(default)]
    pub cluster: LocalObjectRef,
}
