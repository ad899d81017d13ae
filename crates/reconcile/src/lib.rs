//! Inventory-diff reconciliation: converge the live set of generated
//! resources onto the freshly computed desired set, tracking ownership
//! through the inventory persisted in the set resource's status.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use kube::Resource;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info};

use kuset_core::conditions::{Condition, RECONCILIATION_SUCCEEDED_REASON};
use kuset_core::{
    Kustomization, KustomizationSet, ObjMetadata, OwnerReference, ResourceInventory, ResourceRef,
    KUSTOMIZATION_API_VERSION,
};
use kuset_store::{ResourceKey, ResourceStore};

/// Converge the store onto `desired` and return the new inventory.
///
/// Members of the previous inventory are patched in place, new resources
/// are created with an owner link to the set, and previously recorded
/// resources that are no longer desired are deleted. Both sides of the
/// diff are fully materialized before the first mutation; each store call
/// is independent and non-transactional.
pub async fn reconcile_resources(
    store: &dyn ResourceStore,
    set: &KustomizationSet,
    desired: Vec<Kustomization>,
) -> Result<ResourceInventory> {
    let set_name = set.metadata.name.clone().unwrap_or_default();
    let existing = set.status.as_ref().and_then(|s| s.inventory.clone());

    let mut entries: BTreeMap<String, Kustomization> = BTreeMap::new();
    for k in desired {
        let id = k.object_ref().to_string();
        if entries.insert(id.clone(), k).is_some() {
            bail!("duplicate resource id {id} generated for set {set_name}");
        }
    }

    for (id, k) in &entries {
        let key = ResourceKey::new(
            k.metadata.namespace.as_deref().unwrap_or_default(),
            &k.metadata.name,
            &k.kind,
        );
        if existing.as_ref().is_some_and(|inv| inv.contains(id)) {
            let patch = json!({
                "metadata": {
                    "labels": k.metadata.labels,
                    "annotations": k.metadata.annotations,
                },
                "spec": k.spec,
            });
            store
                .patch(&key, &patch)
                .await
                .with_context(|| format!("failed to update Kustomization {id}"))?;
            counter!("kuset_resources_updated", 1u64);
            debug!(id = %id, "updated kustomization");
        } else {
            let obj = creation_payload(k, set)?;
            store
                .create(&obj)
                .await
                .with_context(|| format!("failed to create Kustomization {id}"))?;
            counter!("kuset_resources_created", 1u64);
            debug!(id = %id, "created kustomization");
        }
    }

    // A first-ever pass has nothing recorded, so nothing can be removed.
    if let Some(previous) = &existing {
        for entry in &previous.entries {
            if entries.contains_key(&entry.id) {
                continue;
            }
            let decoded: ObjMetadata = entry
                .id
                .parse()
                .with_context(|| format!("failed to decode inventory entry for set {set_name}"))?;
            store
                .delete(&ResourceKey::new(
                    &decoded.namespace,
                    &decoded.name,
                    &decoded.kind,
                ))
                .await
                .with_context(|| format!("failed to delete Kustomization {}", entry.id))?;
            counter!("kuset_resources_deleted", 1u64);
            debug!(id = %entry.id, "deleted kustomization");
        }
    }

    let inventory = ResourceInventory {
        entries: entries
            .keys()
            .map(|id| ResourceRef {
                id: id.clone(),
                version: KUSTOMIZATION_API_VERSION.to_string(),
            })
            .collect(),
    };
    info!(set = %set_name, entries = inventory.entries.len(), "inventory converged");
    Ok(inventory)
}

/// Ready condition recorded after a successful pass.
pub fn ready_condition(count: usize) -> Condition {
    Condition::ready(
        RECONCILIATION_SUCCEEDED_REASON,
        &format!("{count} kustomizations created"),
    )
}

fn creation_payload(k: &Kustomization, set: &KustomizationSet) -> Result<serde_json::Value> {
    let uid = set
        .metadata
        .uid
        .clone()
        .ok_or_else(|| anyhow!("set resource has no uid; cannot establish owner reference"))?;
    let mut owned = k.clone();
    owned.metadata.owner_references.push(OwnerReference {
        api_version: KustomizationSet::api_version(&()).to_string(),
        kind: KustomizationSet::kind(&()).to_string(),
        name: set.metadata.name.clone().unwrap_or_default(),
        uid,
    });
    serde_json::to_value(&owned).context("serializing Kustomization for create")
}
