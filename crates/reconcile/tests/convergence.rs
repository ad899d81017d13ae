//! End-to-end convergence: list generator → pipeline → inventory diff,
//! across two passes against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use kuset_core::{
    KustomizationSetSpec, KustomizationSetStatus, KustomizationSpec, ListGenerator,
    KustomizationSet, SetGenerator, SetTemplate, SourceRef, TemplateMeta, KUSTOMIZATION_KIND,
};
use kuset_fetch::ArchiveFetcher;
use kuset_generate::scm::{PullRequest, ScmClient, ScmFactory};
use kuset_generate::{generate_kustomizations, Registry};
use kuset_reconcile::reconcile_resources;
use kuset_store::MemoryStore;

#[derive(Debug)]
struct NoScm;

#[async_trait]
impl ScmClient for NoScm {
    async fn list_open(&self, _repo: &str) -> anyhow::Result<Vec<PullRequest>> {
        Ok(Vec::new())
    }
}

fn registry(store: Arc<MemoryStore>) -> Registry {
    let factory: ScmFactory = Arc::new(|_, _, _| Ok(Arc::new(NoScm)));
    Registry::new(store, Arc::new(ArchiveFetcher::new(0)), factory)
}

fn make_set(clusters: &[&str], inventory: Option<kuset_core::ResourceInventory>) -> KustomizationSet {
    let elements = clusters.iter().map(|c| json!({ "cluster": c })).collect();
    let mut ks = KustomizationSet::new(
        "demo-set",
        KustomizationSetSpec {
            generators: vec![SetGenerator {
                list: Some(ListGenerator {
                    elements,
                    template: None,
                }),
                ..Default::default()
            }],
            template: SetTemplate {
                metadata: TemplateMeta {
                    name: "{{.cluster}}-demo".to_string(),
                    ..Default::default()
                },
                spec: KustomizationSpec {
                    interval: Some("5m".to_string()),
                    path: Some("./clusters/{{.cluster}}/".to_string()),
                    prune: Some(true),
                    source_ref: Some(SourceRef {
                        kind: "GitRepository".to_string(),
                        name: "demo-repo".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            },
        },
    );
    ks.metadata.namespace = Some("default".to_string());
    ks.metadata.uid = Some("f81d4fae-7dec-11d0-a765-00a0c91e6bf6".to_string());
    ks.status = Some(KustomizationSetStatus {
        inventory,
        conditions: Vec::new(),
    });
    ks
}

#[tokio::test]
async fn removing_an_element_deletes_its_resource_on_the_next_pass() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());

    // first pass: three clusters
    let set = make_set(&["dev", "prod", "preprod"], None);
    let desired = generate_kustomizations(&registry, &set).await.unwrap();
    assert_eq!(desired.len(), 3);
    let inventory = reconcile_resources(&*store, &set, desired).await.unwrap();
    assert_eq!(inventory.entries.len(), 3);
    assert_eq!(
        store.names(KUSTOMIZATION_KIND),
        vec!["dev-demo", "preprod-demo", "prod-demo"]
    );

    // second pass: prod removed
    let set = make_set(&["dev", "preprod"], Some(inventory));
    let desired = generate_kustomizations(&registry, &set).await.unwrap();
    let inventory = reconcile_resources(&*store, &set, desired).await.unwrap();

    assert_eq!(inventory.entries.len(), 2);
    assert_eq!(
        store.names(KUSTOMIZATION_KIND),
        vec!["dev-demo", "preprod-demo"]
    );
    let deletes: Vec<String> = store
        .ops()
        .into_iter()
        .filter(|op| op.starts_with("delete"))
        .collect();
    assert_eq!(deletes, vec!["delete default/prod-demo Kustomization"]);
}

#[tokio::test]
async fn unchanged_input_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());

    let set = make_set(&["dev", "prod"], None);
    let desired = generate_kustomizations(&registry, &set).await.unwrap();
    let inventory = reconcile_resources(&*store, &set, desired).await.unwrap();

    let set = make_set(&["dev", "prod"], Some(inventory.clone()));
    let desired = generate_kustomizations(&registry, &set).await.unwrap();
    let again = reconcile_resources(&*store, &set, desired).await.unwrap();

    assert_eq!(again, inventory);
    assert!(!store.ops().iter().any(|op| op.starts_with("delete")));
}
