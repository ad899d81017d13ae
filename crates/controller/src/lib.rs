//! Controller loop: one pass per KustomizationSet reconcile event.
//!
//! The surrounding scheduler (kube-runtime) serializes passes per set
//! identity and retries with backoff on error; this crate only implements
//! the pass itself and the requeue policy.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use metrics::{counter, histogram};
use serde_json::json;
use tracing::{debug, info, warn};

use kuset_core::conditions::set_condition;
use kuset_core::KustomizationSet;
use kuset_generate::{generate_kustomizations, minimum_interval, Registry};
use kuset_reconcile::{ready_condition, reconcile_resources};
use kuset_store::ResourceStore;

/// Requeue applied when a pass fails.
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0:#}")]
    Reconcile(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Reconcile(e)
    }
}

/// Shared state for all passes, constructed once at startup.
pub struct Context {
    pub client: Client,
    pub store: Arc<dyn ResourceStore>,
    pub registry: Registry,
    /// Fallback requeue when no generator reports an interval.
    pub default_requeue: Duration,
}

/// One reconciliation pass.
pub async fn reconcile(set: Arc<KustomizationSet>, ctx: Arc<Context>) -> Result<Action, Error> {
    let t0 = Instant::now();
    let name = set.name_any();
    let namespace = set.namespace().unwrap_or_default();
    debug!(name = %name, ns = %namespace, "kustomization set loaded");

    // Owned resources cascade-delete through their owner references.
    if set.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let kustomizations = generate_kustomizations(&ctx.registry, &set).await?;
    let inventory = reconcile_resources(ctx.store.as_ref(), &set, kustomizations).await?;
    let count = inventory.entries.len();

    // Status is only touched after the whole pass succeeded.
    let mut status = set.status.clone().unwrap_or_default();
    status.inventory = Some(inventory);
    set_condition(&mut status.conditions, ready_condition(count));

    let api: Api<KustomizationSet> = Api::namespaced(ctx.client.clone(), &namespace);
    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await
    .map_err(|e| Error::Reconcile(anyhow!(e).context(format!("updating status of set {name}"))))?;

    counter!("kuset_reconcile_ok", 1u64);
    histogram!("kuset_reconcile_duration_ms", t0.elapsed().as_secs_f64() * 1000.0);
    info!(name = %name, count, took_ms = %t0.elapsed().as_millis(), "reconciled kustomization set");

    let requeue = minimum_interval(&ctx.registry, &set).unwrap_or(ctx.default_requeue);
    Ok(Action::requeue(requeue))
}

pub fn error_policy(set: Arc<KustomizationSet>, error: &Error, _ctx: Arc<Context>) -> Action {
    counter!("kuset_reconcile_err", 1u64);
    warn!(name = %set.name_any(), error = %error, "reconcile failed");
    Action::requeue(ERROR_REQUEUE)
}

/// Run the controller until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let sets: Api<KustomizationSet> = Api::all(ctx.client.clone());
    Controller::new(sets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(name = %obj.name, "pass finished"),
                Err(e) => warn!(error = %e, "pass errored"),
            }
        })
        .await;
    info!("controller stopped");
}
