//! Read-only, cache-backed resource lookups

use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::{
    runtime::{
        reflector::{self, ObjectRef, Store},
        watcher::{self, watcher, Event},
        WatchStreamExt,
    },
    Api, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Equality-based label selector; every pair must be present on a match
pub type LabelSelector = BTreeMap<String, String>;

/// Read access to a local mirror of one resource kind
pub trait ObjectStore<K>: Send + Sync {
    /// Look up an object by namespace and name
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>>;

    /// List objects in a namespace whose labels match the selector
    fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Arc<K>>>;

    /// Whether the mirror has completed its initial sync
    fn has_synced(&self) -> bool;
}

/// Whether `labels` satisfies every pair of `selector`
pub fn matches_labels(labels: &BTreeMap<String, String>, selector: &LabelSelector) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Store backed by a kube reflector
pub struct ReflectorStore<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    reader: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> Clone for ReflectorStore<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            synced: self.synced.clone(),
        }
    }
}

impl<K> ObjectStore<K> for ReflectorStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>> {
        Ok(self.reader.get(&ObjectRef::new(name).within(namespace)))
    }

    fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Arc<K>>> {
        Ok(self
            .reader
            .state()
            .into_iter()
            .filter(|obj| obj.namespace().as_deref() == Some(namespace))
            .filter(|obj| matches_labels(obj.labels(), selector))
            .collect())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Build a reflector-backed store for `api` and the future that drives it.
///
/// `on_add` is called once per object the first time the watch reports it,
/// whether from the initial list or a later apply. Deleted objects are
/// forgotten, so a re-created object is reported again.
pub fn informer<K, F>(
    api: Api<K>,
    config: watcher::Config,
    mut on_add: F,
) -> (ReflectorStore<K>, BoxFuture<'static, ()>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    F: FnMut(&K) + Send + 'static,
{
    let (reader, writer) = reflector::store::<K>();
    let synced = Arc::new(AtomicBool::new(false));
    let store = ReflectorStore {
        reader,
        synced: synced.clone(),
    };

    let driver = async move {
        let kind = K::kind(&()).to_string();
        let stream = reflector::reflector(writer, watcher(api, config).default_backoff());
        let mut stream = std::pin::pin!(stream);

        let mut seen: HashSet<ObjectRef<K>> = HashSet::new();
        let mut listed: HashSet<ObjectRef<K>> = HashSet::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Init) => listed.clear(),
                Ok(Event::InitApply(obj)) => {
                    let key = ObjectRef::from_obj(&obj);
                    if !seen.contains(&key) {
                        on_add(&obj);
                    }
                    listed.insert(key);
                }
                Ok(Event::InitDone) => {
                    seen = std::mem::take(&mut listed);
                    if !synced.swap(true, Ordering::AcqRel) {
                        info!(kind = %kind, objects = seen.len(), "Cache synced");
                    }
                }
                Ok(Event::Apply(obj)) => {
                    if seen.insert(ObjectRef::from_obj(&obj)) {
                        on_add(&obj);
                    }
                }
                Ok(Event::Delete(obj)) => {
                    debug!(kind = %kind, name = %obj.name_any(), "Object deleted");
                    seen.remove(&ObjectRef::from_obj(&obj));
                }
                Err(e) => warn!(kind = %kind, error = %e, "Watch error"),
            }
        }
        warn!(kind = %kind, "Watch stream ended");
    }
    .boxed();

    (store, driver)
}
