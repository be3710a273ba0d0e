//! Status condition persistence

use async_trait::async_trait;
use kube::{api::PostParams, Api, Client, ResourceExt};
use tracing::{debug, warn};

use crate::crd::{MySqlRestore, RestoreCondition};
use crate::error::{Error, Result};

use super::writer::write_error;

/// Default number of attempts before a conflicting status write gives up
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 5;

/// Upserts a status condition on a restore
#[async_trait]
pub trait ConditionUpdater: Send + Sync {
    /// Set `condition` on the stored restore, replacing any condition of the
    /// same type. Write conflicts are retried internally.
    async fn update(&self, restore: &MySqlRestore, condition: RestoreCondition) -> Result<()>;
}

/// Condition updater writing the status subresource
pub struct KubeConditionUpdater {
    client: Client,
    max_attempts: u32,
}

impl KubeConditionUpdater {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_CONFLICT_ATTEMPTS,
        }
    }
}

#[async_trait]
impl ConditionUpdater for KubeConditionUpdater {
    async fn update(&self, restore: &MySqlRestore, condition: RestoreCondition) -> Result<()> {
        let name = restore.name_any();
        let namespace = restore
            .namespace()
            .ok_or_else(|| Error::config(format!("MySqlRestore {} has no namespace", name)))?;
        let api: Api<MySqlRestore> = Api::namespaced(self.client.clone(), &namespace);

        let mut current = restore.clone();
        for attempt in 1..=self.max_attempts {
            current.set_condition(condition.clone());
            let body = serde_json::to_vec(&current)?;
            match api.replace_status(&name, &PostParams::default(), body).await {
                Ok(_) => {
                    debug!(
                        name = %name,
                        namespace = %namespace,
                        condition = %condition.type_,
                        status = %condition.status,
                        "Updated MySqlRestore condition"
                    );
                    return Ok(());
                }
                Err(kube::Error::Api(resp)) if resp.code == 409 => {
                    warn!(
                        name = %name,
                        attempt,
                        "Conflict updating MySqlRestore condition, refetching"
                    );
                    current = api.get_status(&name).await?;
                }
                Err(e) => return Err(write_error(e, &namespace, &name)),
            }
        }

        Err(Error::Conflict(format!(
            "{}/{}: condition {} not written after {} attempts",
            namespace, name, condition.type_, self.max_attempts
        )))
    }
}
