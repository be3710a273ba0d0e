//! Placement of restores onto cluster members

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

use crate::adapters::{LabelSelector, ObjectStore};
use crate::crd::{
    ConditionStatus, MySqlRestore, RestoreCondition, RestoreConditionType, CLUSTER_LABEL,
    ROLE_LABEL, ROLE_PRIMARY,
};
use crate::error::{Error, Result};

/// Result of a scheduling decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Member chosen by this call
    Assigned(String),
    /// Restore already carried a member; nothing changed
    AlreadyScheduled(String),
    /// Member was persisted without its `Scheduled` condition; the member is
    /// kept and only the condition was set
    Resumed(String),
}

/// Selector for the primary member of `cluster`
pub fn primary_selector(cluster: &str) -> LabelSelector {
    LabelSelector::from([
        (CLUSTER_LABEL.to_string(), cluster.to_string()),
        (ROLE_LABEL.to_string(), ROLE_PRIMARY.to_string()),
    ])
}

/// Pick a member from the candidates.
///
/// Candidates are ordered by name first so that the choice does not depend
/// on cache iteration order when more than one primary matches.
pub fn select_member<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Pod>,
{
    candidates.into_iter().map(|pod| pod.name_any()).min()
}

/// Assign `restore` to the primary of its cluster.
///
/// Only the in-memory copy is modified: `spec.scheduledMember` is set and the
/// `Scheduled` condition becomes `True`. A member that is already set is
/// never replaced. Fails with [`Error::NoPrimary`] when the cluster has no
/// primary.
pub fn schedule(restore: &mut MySqlRestore, pods: &dyn ObjectStore<Pod>) -> Result<Placement> {
    if restore.is_scheduled() {
        return Ok(Placement::AlreadyScheduled(
            restore.spec.scheduled_member.clone(),
        ));
    }
    if !restore.spec.scheduled_member.is_empty() {
        restore.set_condition(RestoreCondition::new(
            RestoreConditionType::Scheduled,
            ConditionStatus::True,
        ));
        return Ok(Placement::Resumed(restore.spec.scheduled_member.clone()));
    }

    let cluster = restore.spec.cluster.name.clone();
    let namespace = restore.namespace().unwrap_or_default();

    let primaries = pods
        .list(&namespace, &primary_selector(&cluster))
        .map_err(|e| Error::store(format!("error listing Pods: {}", e)))?;
    debug!(
        cluster = %cluster,
        namespace = %namespace,
        candidates = primaries.len(),
        "Listed primaries"
    );

    let member = select_member(primaries.iter().map(|pod| &**pod))
        .ok_or(Error::NoPrimary { cluster })?;

    restore.set_condition(RestoreCondition::new(
        RestoreConditionType::Scheduled,
        ConditionStatus::True,
    ));
    restore.spec.scheduled_member = member.clone();
    Ok(Placement::Assigned(member))
}
