//! Custom Resource Definitions for the MySQL Restore Operator

mod mysql_backup;
mod mysql_cluster;
mod mysql_restore;

pub use mysql_backup::*;
pub use mysql_cluster::*;
pub use mysql_restore::*;

use kube::CustomResourceExt;

/// API group shared by every custom resource of the operator
pub const GROUP: &str = "mysql.oso.sh";

/// Label naming the cluster a pod belongs to
pub const CLUSTER_LABEL: &str = "mysql.oso.sh/cluster";

/// Label carrying the role of a cluster member
pub const ROLE_LABEL: &str = "mysql.oso.sh/role";

/// Role label value of the primary member
pub const ROLE_PRIMARY: &str = "primary";

/// Label stamped on resources with the operator version that defaulted them
pub const OPERATOR_VERSION_LABEL: &str = "mysql.oso.sh/operator-version";

/// Version of this operator build
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![
        serde_yaml::to_string(&MySqlCluster::crd())?,
        serde_yaml::to_string(&MySqlBackup::crd())?,
        serde_yaml::to_string(&MySqlRestore::crd())?,
    ])
}
