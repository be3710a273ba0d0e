//! In-memory stand-ins for the Kubernetes-backed adapters

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};

use mysql_restore_operator::adapters::{
    matches_labels, ConditionUpdater, EventRecorder, LabelSelector, ObjectStore, RestoreWriter,
};
use mysql_restore_operator::config::OperatorConfig;
use mysql_restore_operator::controllers::RestoreController;
use mysql_restore_operator::crd::{
    LocalObjectRef, MySqlBackup, MySqlBackupSpec, MySqlCluster, MySqlClusterSpec, MySqlRestore,
    MySqlRestoreSpec, RestoreCondition, CLUSTER_LABEL, ROLE_LABEL, ROLE_PRIMARY,
};
use mysql_restore_operator::reconcilers::restore::RestoreReconciler;
use mysql_restore_operator::{Error, Result};

pub const NAMESPACE: &str = "ns";

// ============================================================================
// Store
// ============================================================================

pub struct MemoryStore<K> {
    objects: Mutex<Vec<Arc<K>>>,
    synced: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl<K: Resource + Clone> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            synced: AtomicBool::new(true),
            failure: Mutex::new(None),
        }
    }

    /// Insert or replace an object by namespace and name
    pub fn put(&self, obj: K) {
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|o| !(o.namespace() == obj.namespace() && o.name_any() == obj.name_any()));
        objects.push(Arc::new(obj));
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Make every lookup fail with a store error
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    fn check(&self) -> Result<()> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(Error::store(message.clone())),
            None => Ok(()),
        }
    }
}

impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>> {
        self.check()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.namespace().as_deref() == Some(namespace) && o.name_any() == name)
            .cloned())
    }

    fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Arc<K>>> {
        self.check()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.namespace().as_deref() == Some(namespace))
            .filter(|o| matches_labels(o.labels(), selector))
            .cloned()
            .collect())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Writer, condition updater, recorder
// ============================================================================

#[derive(Default)]
pub struct RecordingWriter {
    pub updates: Mutex<Vec<MySqlRestore>>,
    conflict: AtomicBool,
    version: AtomicUsize,
}

impl RecordingWriter {
    pub fn conflict_next(&self) {
        self.conflict.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<MySqlRestore> {
        self.updates.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RestoreWriter for RecordingWriter {
    async fn update(&self, restore: &MySqlRestore) -> Result<MySqlRestore> {
        if self.conflict.swap(false, Ordering::SeqCst) {
            return Err(Error::Conflict(format!("{}/{}", NAMESPACE, restore.name_any())));
        }
        let mut stored = restore.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        stored.metadata.resource_version = Some(version.to_string());
        self.updates.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
pub struct RecordingConditions {
    pub updates: Mutex<Vec<(String, RestoreCondition)>>,
    fail: AtomicBool,
}

impl RecordingConditions {
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<RestoreCondition> {
        self.updates.lock().unwrap().last().map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl ConditionUpdater for RecordingConditions {
    async fn update(&self, restore: &MySqlRestore, condition: RestoreCondition) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Conflict(restore.name_any()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((restore.name_any(), condition));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
pub struct RecordingRecorder {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingRecorder {
    pub fn all(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRecorder for RecordingRecorder {
    async fn publish(&self, _restore: &MySqlRestore, type_: EventType, reason: &str, note: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
        });
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub restores: Arc<MemoryStore<MySqlRestore>>,
    pub clusters: Arc<MemoryStore<MySqlCluster>>,
    pub backups: Arc<MemoryStore<MySqlBackup>>,
    pub pods: Arc<MemoryStore<Pod>>,
    pub writer: Arc<RecordingWriter>,
    pub conditions: Arc<RecordingConditions>,
    pub recorder: Arc<RecordingRecorder>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            restores: Arc::new(MemoryStore::new()),
            clusters: Arc::new(MemoryStore::new()),
            backups: Arc::new(MemoryStore::new()),
            pods: Arc::new(MemoryStore::new()),
            writer: Arc::new(RecordingWriter::default()),
            conditions: Arc::new(RecordingConditions::default()),
            recorder: Arc::new(RecordingRecorder::default()),
        }
    }

    pub fn reconciler(&self) -> RestoreReconciler {
        RestoreReconciler {
            restores: self.restores.clone(),
            clusters: self.clusters.clone(),
            backups: self.backups.clone(),
            pods: self.pods.clone(),
            writer: self.writer.clone(),
            conditions: self.conditions.clone(),
            recorder: self.recorder.clone(),
        }
    }

    pub fn controller(&self, config: &OperatorConfig) -> RestoreController {
        RestoreController::new(self.reconciler(), config)
    }

    /// Cluster `db1`, backup `b1` and primary `pod-0`
    pub fn with_defaults(self) -> Self {
        self.clusters.put(cluster("db1"));
        self.backups.put(backup("b1"));
        self.pods.put(primary_pod("pod-0", "db1"));
        self
    }
}

fn metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

pub fn restore(name: &str, cluster: &str, backup: &str) -> MySqlRestore {
    MySqlRestore {
        metadata: metadata(name),
        spec: MySqlRestoreSpec {
            cluster: LocalObjectRef::new(cluster),
            backup: LocalObjectRef::new(backup),
            scheduled_member: String::new(),
        },
        status: None,
    }
}

pub fn cluster(name: &str) -> MySqlCluster {
    MySqlCluster {
        metadata: metadata(name),
        spec: MySqlClusterSpec { members: 3 },
    }
}

pub fn backup(name: &str) -> MySqlBackup {
    MySqlBackup {
        metadata: metadata(name),
        spec: MySqlBackupSpec {
            cluster: LocalObjectRef::new("db1"),
        },
    }
}

pub fn pod_with_labels(name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..metadata(name)
        },
        ..Default::default()
    }
}

pub fn primary_pod(name: &str, cluster: &str) -> Pod {
    pod_with_labels(name, &[(CLUSTER_LABEL, cluster), (ROLE_LABEL, ROLE_PRIMARY)])
}

pub fn secondary_pod(name: &str, cluster: &str) -> Pod {
    pod_with_labels(name, &[(CLUSTER_LABEL, cluster), (ROLE_LABEL, "secondary")])
}
