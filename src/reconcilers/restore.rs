//! MySqlRestore reconciler
//!
//! Handles the business logic for restore requests:
//! - Spec validation
//! - Cluster and backup reference checks
//! - Scheduling onto the cluster primary
//! - Recording the outcome as conditions and events

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::{runtime::events::EventType, ResourceExt};
use tracing::{debug, info, warn};

use crate::adapters::{reasons, ConditionUpdater, EventRecorder, ObjectStore, RestoreWriter};
use crate::controllers::split_key;
use crate::crd::{
    ConditionStatus, MySqlBackup, MySqlCluster, MySqlRestore, RestoreCondition,
    RestoreConditionType, OPERATOR_VERSION_LABEL,
};
use crate::error::{Error, Result};
use crate::metrics;

use super::field::{FieldError, FieldPath, ValidationError};
use super::scheduler::{self, Placement};

const MAX_NAME_LENGTH: usize = 253;
const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Validate the MySqlRestore spec
pub fn validate(restore: &MySqlRestore) -> Option<ValidationError> {
    let spec = FieldPath::new("spec");
    let mut errors = Vec::new();

    check_reference_name(
        &mut errors,
        spec.child("cluster").child("name"),
        &restore.spec.cluster.name,
    );
    check_reference_name(
        &mut errors,
        spec.child("backup").child("name"),
        &restore.spec.backup.name,
    );

    if let Some(version) = restore.labels().get(OPERATOR_VERSION_LABEL) {
        if !is_label_value(version) {
            errors.push(FieldError::invalid(
                FieldPath::new("metadata")
                    .child("labels")
                    .child(OPERATOR_VERSION_LABEL),
                version.clone(),
                "must be a valid label value",
            ));
        }
    }

    ValidationError::aggregate(errors)
}

fn check_reference_name(errors: &mut Vec<FieldError>, path: FieldPath, name: &str) {
    if name.is_empty() {
        errors.push(FieldError::required(path, ""));
    } else if !is_dns1123_subdomain(name) {
        errors.push(FieldError::invalid(
            path,
            name,
            "must be a lowercase RFC 1123 subdomain",
        ));
    }
}

/// RFC 1123 subdomain, as used for object names
pub fn is_dns1123_subdomain(value: &str) -> bool {
    value.len() <= MAX_NAME_LENGTH
        && value.split('.').all(|label| {
            !label.is_empty()
                && label
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}

fn is_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    value.len() <= MAX_LABEL_VALUE_LENGTH
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Check that the cluster and backup a restore names exist.
///
/// Missing references are reported as field errors; any other lookup
/// failure is returned as `Err`.
pub fn check_references(
    restore: &MySqlRestore,
    clusters: &dyn ObjectStore<MySqlCluster>,
    backups: &dyn ObjectStore<MySqlBackup>,
) -> Result<Option<ValidationError>> {
    let namespace = restore.namespace().unwrap_or_default();
    let spec = FieldPath::new("spec");
    let mut errors = Vec::new();

    let cluster = &restore.spec.cluster.name;
    if clusters.get(&namespace, cluster)?.is_none() {
        errors.push(FieldError::not_found(
            spec.child("cluster").child("name"),
            cluster,
        ));
    }

    let backup = &restore.spec.backup.name;
    if backups.get(&namespace, backup)?.is_none() {
        errors.push(FieldError::not_found(
            spec.child("backup").child("name"),
            backup,
        ));
    }

    Ok(ValidationError::aggregate(errors))
}

/// What a single sync did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Restore was assigned to `member` and persisted
    Scheduled { member: String },
    /// Restore already carried a member; left untouched
    AlreadyScheduled,
    /// Restore is marked failed; left untouched
    Terminal,
    /// Restore failed validation and was marked failed
    Invalid(ValidationError),
}

/// Level-triggered sync handler for MySqlRestore keys
pub struct RestoreReconciler {
    pub restores: Arc<dyn ObjectStore<MySqlRestore>>,
    pub clusters: Arc<dyn ObjectStore<MySqlCluster>>,
    pub backups: Arc<dyn ObjectStore<MySqlBackup>>,
    pub pods: Arc<dyn ObjectStore<Pod>>,
    pub writer: Arc<dyn RestoreWriter>,
    pub conditions: Arc<dyn ConditionUpdater>,
    pub recorder: Arc<dyn EventRecorder>,
}

impl RestoreReconciler {
    /// Reconcile the restore stored under `key`.
    ///
    /// Errors are transient and the key should be retried with backoff.
    /// Validation failures are not errors: they are recorded on the restore.
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome> {
        let (namespace, name) = split_key(key)?;

        let cached = self
            .restores
            .get(namespace, name)?
            .ok_or_else(|| Error::RestoreNotFound(key.to_string()))?;

        if cached.is_scheduled() {
            debug!(
                key,
                member = %cached.spec.scheduled_member,
                "MySqlRestore already scheduled"
            );
            return Ok(SyncOutcome::AlreadyScheduled);
        }
        if cached.has_condition_true(RestoreConditionType::Failed) {
            debug!(key, "MySqlRestore has failed, skipping");
            return Ok(SyncOutcome::Terminal);
        }

        // Cached objects are shared; work on a copy.
        let mut restore = MySqlRestore::clone(&cached).ensure_defaults();

        let invalid = match validate(&restore) {
            Some(err) => Some(err),
            None => check_references(&restore, self.clusters.as_ref(), self.backups.as_ref())?,
        };

        if let Some(err) = invalid {
            let message = err.to_string();
            warn!(key, error = %message, "MySqlRestore failed validation");
            metrics::VALIDATION_FAILURES
                .with_label_values(&[namespace])
                .inc();
            self.recorder
                .publish(
                    &restore,
                    EventType::Warning,
                    reasons::FAILED_VALIDATION,
                    message.clone(),
                )
                .await;
            // Only a failed status write is retried; validation is not.
            self.conditions
                .update(
                    &restore,
                    RestoreCondition::new(RestoreConditionType::Failed, ConditionStatus::False)
                        .with_reason(reasons::FAILED_VALIDATION)
                        .with_message(message),
                )
                .await?;
            return Ok(SyncOutcome::Invalid(err));
        }

        match scheduler::schedule(&mut restore, self.pods.as_ref())
            .map_err(|e| Error::Schedule(Box::new(e)))?
        {
            Placement::AlreadyScheduled(_) => return Ok(SyncOutcome::AlreadyScheduled),
            Placement::Assigned(member) => {
                debug!(key, member = %member, "Selected primary");
            }
            Placement::Resumed(member) => {
                debug!(key, member = %member, "Keeping previously assigned member");
            }
        }

        let updated = self
            .writer
            .update(&restore)
            .await
            .map_err(|e| Error::Update(Box::new(e)))?;
        let member = updated.spec.scheduled_member.clone();

        metrics::RESTORES_SCHEDULED
            .with_label_values(&[namespace])
            .inc();
        info!(key, member = %member, "Scheduled MySqlRestore");
        self.recorder
            .publish(
                &updated,
                EventType::Normal,
                reasons::SUCCESS_SCHEDULED,
                format!("Scheduled on Pod {:?}", member),
            )
            .await;

        Ok(SyncOutcome::Scheduled { member })
    }
}
