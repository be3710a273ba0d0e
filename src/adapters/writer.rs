//! Typed write client for restores

use async_trait::async_trait;
use kube::{api::PostParams, Api, Client, ResourceExt};
use tracing::debug;

use crate::crd::MySqlRestore;
use crate::error::{Error, Result};

/// Persists a modified restore, with optimistic-concurrency semantics
#[async_trait]
pub trait RestoreWriter: Send + Sync {
    /// Write `restore` back and return the stored object.
    ///
    /// A stale resource version fails with a conflict; callers retry.
    async fn update(&self, restore: &MySqlRestore) -> Result<MySqlRestore>;
}

/// Writer using the Kubernetes API
pub struct KubeRestoreWriter {
    client: Client,
}

impl KubeRestoreWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RestoreWriter for KubeRestoreWriter {
    async fn update(&self, restore: &MySqlRestore) -> Result<MySqlRestore> {
        let name = restore.name_any();
        let namespace = restore
            .namespace()
            .ok_or_else(|| Error::config(format!("MySqlRestore {} has no namespace", name)))?;
        let api: Api<MySqlRestore> = Api::namespaced(self.client.clone(), &namespace);

        let mut updated = api
            .replace(&name, &PostParams::default(), restore)
            .await
            .map_err(|e| write_error(e, &namespace, &name))?;

        // Spec and status live behind separate endpoints.
        if let Some(status) = &restore.status {
            updated.status = Some(status.clone());
            updated = api
                .replace_status(&name, &PostParams::default(), serde_json::to_vec(&updated)?)
                .await
                .map_err(|e| write_error(e, &namespace, &name))?;
        }

        debug!(
            name = %name,
            namespace = %namespace,
            resource_version = updated.resource_version().as_deref().unwrap_or(""),
            "Updated MySqlRestore"
        );
        Ok(updated)
    }
}

/// Map a write failure, singling out optimistic-concurrency conflicts
pub(crate) fn write_error(err: kube::Error, namespace: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => {
            Error::Conflict(format!("{}/{}: {}", namespace, name, resp.message))
        }
        other => Error::Kube(other),
    }
}
