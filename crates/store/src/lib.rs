//! Resource store boundary.
//!
//! The generators and the inventory reconciler talk to the cluster through
//! this trait; tests swap in the in-memory implementation.

#![forbid(unsafe_code)]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde_json::Value;
use tracing::debug;

/// Identity of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new(namespace: &str, name: &str, kind: &str) -> Self {
        ResourceKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.namespace, self.name, self.kind)
    }
}

/// Minimal store surface: get/create/patch/delete by namespace, name and
/// kind. Patch applies an overwrite-merge of the supplied document.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Value>>;
    async fn create(&self, obj: &Value) -> Result<()>;
    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<()>;
    async fn delete(&self, key: &ResourceKey) -> Result<()>;
}

// ---- kube-backed implementation ----

/// Store backed by a kube client over dynamic objects.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        KubeStore { client }
    }

    fn api_for(&self, namespace: &str, kind: &str) -> Result<Api<DynamicObject>> {
        let gvk = match kind {
            "Kustomization" => {
                GroupVersionKind::gvk("kustomize.toolkit.fluxcd.io", "v1beta2", "Kustomization")
            }
            "GitRepository" => {
                GroupVersionKind::gvk("source.toolkit.fluxcd.io", "v1beta2", "GitRepository")
            }
            "Secret" => GroupVersionKind::gvk("", "v1", "Secret"),
            other => bail!("no API mapping for kind {other}"),
        };
        let ar = ApiResource::from_gvk(&gvk);
        Ok(Api::namespaced_with(self.client.clone(), namespace, &ar))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Value>> {
        let api = self.api_for(&key.namespace, &key.kind)?;
        let obj = api
            .get_opt(&key.name)
            .await
            .with_context(|| format!("getting {key}"))?;
        match obj {
            Some(o) => Ok(Some(serde_json::to_value(o)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, obj: &Value) -> Result<()> {
        let kind = obj
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("object missing kind"))?
            .to_string();
        let namespace = obj
            .pointer("/metadata/namespace")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("object missing metadata.namespace"))?
            .to_string();
        let dyn_obj: DynamicObject =
            serde_json::from_value(obj.clone()).context("converting object for create")?;
        let api = self.api_for(&namespace, &kind)?;
        let name = dyn_obj.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), &dyn_obj)
            .await
            .with_context(|| format!("creating {namespace}/{name} ({kind})"))?;
        debug!(%namespace, %name, %kind, "created resource");
        Ok(())
    }

    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<()> {
        let api = self.api_for(&key.namespace, &key.kind)?;
        api.patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .with_context(|| format!("patching {key}"))?;
        debug!(key = %key, "patched resource");
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        let api = self.api_for(&key.namespace, &key.kind)?;
        match api.delete(&key.name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(key = %key, "deleted resource");
                Ok(())
            }
            // already gone is as good as deleted
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting {key}")),
        }
    }
}

// ---- in-memory implementation ----

use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory store for tests. Records every mutating call in an op log so
/// tests can assert on what a pass actually did.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ResourceKey, Value>>,
    ops: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording an op.
    pub fn insert(&self, key: ResourceKey, obj: Value) {
        self.objects.lock().unwrap().insert(key, obj);
    }

    /// Names of stored objects of the given kind, sorted.
    pub fn names(&self, kind: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.kind == kind)
            .map(|k| k.name.clone())
            .collect()
    }

    pub fn object(&self, key: &ResourceKey) -> Option<Value> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: &str, key: &ResourceKey) {
        self.ops
            .lock()
            .unwrap()
            .push(format!("{op} {}/{} {}", key.namespace, key.name, key.kind));
    }
}

/// JSON-merge-patch semantics: objects merge recursively, null removes,
/// everything else replaces.
fn merge_value(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (k, v) in p {
                if v.is_null() {
                    t.remove(k);
                } else {
                    merge_value(t.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Value>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn create(&self, obj: &Value) -> Result<()> {
        let key = ResourceKey::new(
            obj.pointer("/metadata/namespace")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("object missing metadata.namespace"))?,
            obj.pointer("/metadata/name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("object missing metadata.name"))?,
            obj.get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("object missing kind"))?,
        );
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            bail!("{key} already exists");
        }
        objects.insert(key.clone(), obj.clone());
        drop(objects);
        self.record("create", &key);
        Ok(())
    }

    async fn patch(&self, key: &ResourceKey, patch: &Value) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let target = objects
            .get_mut(key)
            .ok_or_else(|| anyhow!("{key} not found"))?;
        merge_value(target, patch);
        drop(objects);
        self.record("patch", key);
        Ok(())
    }

    async fn delete(&self, key: &ResourceKey) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        self.record("delete", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(ns: &str, name: &str, kind: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"namespace": ns, "name": name},
            "spec": {"path": "/a", "prune": true},
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        store.create(&obj("default", "x", "Kustomization")).await.unwrap();
        let key = ResourceKey::new("default", "x", "Kustomization");
        let got = store.get(&key).await.unwrap().unwrap();
        assert_eq!(got.pointer("/spec/path").unwrap(), "/a");
        assert_eq!(store.ops(), vec!["create default/x Kustomization"]);
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = MemoryStore::new();
        store.create(&obj("default", "x", "Kustomization")).await.unwrap();
        assert!(store.create(&obj("default", "x", "Kustomization")).await.is_err());
    }

    #[tokio::test]
    async fn patch_merges_objects_and_replaces_scalars() {
        let store = MemoryStore::new();
        store.create(&obj("default", "x", "Kustomization")).await.unwrap();
        let key = ResourceKey::new("default", "x", "Kustomization");
        store
            .patch(&key, &json!({"spec": {"path": "/b"}, "metadata": {"labels": {"a": "1"}}}))
            .await
            .unwrap();
        let got = store.object(&key).unwrap();
        assert_eq!(got.pointer("/spec/path").unwrap(), "/b");
        assert_eq!(got.pointer("/spec/prune").unwrap(), true);
        assert_eq!(got.pointer("/metadata/labels/a").unwrap(), "1");
    }

    #[tokio::test]
    async fn delete_removes_and_is_logged() {
        let store = MemoryStore::new();
        store.create(&obj("default", "x", "Kustomization")).await.unwrap();
        let key = ResourceKey::new("default", "x", "Kustomization");
        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        assert_eq!(
            store.ops(),
            vec!["create default/x Kustomization", "delete default/x Kustomization"]
        );
    }
}
