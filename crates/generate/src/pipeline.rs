//! Generation pipeline: one rendered Kustomization per parameter record,
//! across all generator entries in declaration order.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use kuset_core::{Kustomization, KustomizationSet};

use crate::merge::merge_template;
use crate::render::render_kustomization;
use crate::Registry;

/// Expand the set into its desired Kustomizations. Any generator or
/// render failure aborts the whole pass; nothing is partially yielded.
pub async fn generate_kustomizations(
    registry: &Registry,
    set: &KustomizationSet,
) -> Result<Vec<Kustomization>> {
    let set_name = set.metadata.name.clone().unwrap_or_default();
    let namespace = set.metadata.namespace.clone().unwrap_or_default();

    let mut res = Vec::new();
    for entry in &set.spec.generators {
        for kind in entry.active_kinds() {
            let generator = registry.generator(kind);
            let merged = merge_template(generator.template(entry), &set.spec.template);
            let params = generator.generate(entry, set).await.with_context(|| {
                format!("failed to transform template for set {set_name} ({kind} generator)")
            })?;
            let Some(params) = params else {
                continue;
            };
            debug!(set = %set_name, generator = %kind, records = params.len(), "generated params");

            let template = Kustomization::from_template(&merged);
            for record in &params {
                let mut rendered = render_kustomization(&template, record)
                    .with_context(|| format!("failed to render template params for set {set_name}"))?;
                rendered.metadata.namespace = Some(namespace.clone());
                res.push(rendered);
            }
        }
    }
    info!(set = %set_name, count = res.len(), "generated kustomizations");
    Ok(res)
}

/// The smallest re-poll interval any active generator reports, if any.
/// Drives the scheduler's requeue for sources that cannot be watched.
pub fn minimum_interval(registry: &Registry, set: &KustomizationSet) -> Option<Duration> {
    let mut min: Option<Duration> = None;
    for entry in &set.spec.generators {
        for kind in entry.active_kinds() {
            if let Some(d) = registry.generator(kind).interval(entry) {
                min = Some(match min {
                    Some(m) if m < d => m,
                    _ => d,
                });
            }
        }
    }
    min
}
