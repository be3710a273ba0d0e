//! MySqlCluster Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MySqlCluster resource specification
///
/// The restore controller only checks that a referenced cluster exists.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "mysql.oso.sh",
    version = "v1alpha1",
    kind = "MySqlCluster",
    plural = "mysqlclusters",
    singular = "mysqlcluster",
    shortname = "myc",
    namespaced,
    printcolumn = r#"{"name": "Members", "type": "integer", "jsonPath": ".spec.members"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MySqlClusterSpec {
    /// Number of group members
    #[serde(default = "default_members")]
    pub members: u32,
}

fn default_members() -> u32 {
    1
}
