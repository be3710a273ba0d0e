//! Work queue keys: `<namespace>/<name>`, or `<name>` for cluster-scoped objects

use kube::ResourceExt;

use crate::error::{Error, Result};

/// Build the queue key of an object
pub fn object_key<K: ResourceExt>(obj: &K) -> Result<String> {
    let name = obj
        .meta()
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::invalid_key("object has no name"))?;
    Ok(match obj.namespace() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
        _ => name.to_string(),
    })
}

/// Split a queue key into namespace (empty for cluster-scoped) and name
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok(("", name)),
        [ns, name] if !name.is_empty() => Ok((ns, name)),
        _ => Err(Error::invalid_key(format!("unexpected key format: {:?}", key))),
    }
}
