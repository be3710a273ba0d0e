//! Kubernetes Event recording for restores.
//!
//! Events are fire-and-forget: failures are logged and never reach the
//! reconciler.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

use crate::crd::MySqlRestore;

/// Name the controller reports events under
pub const CONTROLLER_NAME: &str = "mysql-restore-operator";

/// Well-known event reasons
pub mod reasons {
    /// Restore spec or references failed validation
    pub const FAILED_VALIDATION: &str = "FailedValidation";
    /// Restore assigned to a cluster member
    pub const SUCCESS_SCHEDULED: &str = "SuccessScheduled";
}

/// Publishes Kubernetes Events about a restore
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(&self, restore: &MySqlRestore, type_: EventType, reason: &str, note: String);
}

/// Recorder backed by `kube::runtime::events::Recorder`
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(&self, restore: &MySqlRestore, type_: EventType, reason: &str, note: String) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            restore.object_ref(&()),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Scheduling".to_string(),
            secondary: None,
        };
        let reason = event.reason.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(event).await {
                warn!(reason = %reason, error = %e, "Failed to publish Kubernetes event");
            }
        });
    }
}
