//! GitRepository generator: one record per file in the referenced
//! file-source's archived snapshot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use kuset_core::{KustomizationSet, ParamRecord, SetGenerator, SetTemplate};
use kuset_fetch::ArchiveFetcher;
use kuset_store::{ResourceKey, ResourceStore};

use crate::Generator;

pub struct GitRepositoryGenerator {
    store: Arc<dyn ResourceStore>,
    fetcher: Arc<ArchiveFetcher>,
}

impl GitRepositoryGenerator {
    pub fn new(store: Arc<dyn ResourceStore>, fetcher: Arc<ArchiveFetcher>) -> Self {
        GitRepositoryGenerator { store, fetcher }
    }
}

#[async_trait]
impl Generator for GitRepositoryGenerator {
    async fn generate(
        &self,
        entry: &SetGenerator,
        set: &KustomizationSet,
    ) -> Result<Option<Vec<ParamRecord>>> {
        let Some(config) = entry.git_repository.as_ref() else {
            return Ok(None);
        };

        let namespace = set.metadata.namespace.clone().unwrap_or_default();
        let key = ResourceKey::new(&namespace, &config.repository_ref, "GitRepository");
        let repository = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| anyhow!("could not load GitRepository {key}"))?;

        let url = repository
            .pointer("/status/artifact/url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("GitRepository {key} has no artifact URL yet"))?;
        let checksum = repository
            .pointer("/status/artifact/checksum")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("GitRepository {key} has no artifact checksum yet"))?;
        debug!(key = %key, url = %url, "fetching repository artifact");

        let records = self
            .fetcher
            .fetch_and_parse(url, checksum, &config.directories)
            .await
            .with_context(|| format!("parsing artifact of GitRepository {key}"))?;
        Ok(Some(records))
    }

    // No fixed interval: the upstream watch fires when the snapshot changes.
    fn interval(&self, _entry: &SetGenerator) -> Option<Duration> {
        None
    }

    fn template<'a>(&self, entry: &'a SetGenerator) -> Option<&'a SetTemplate> {
        entry.git_repository.as_ref().and_then(|c| c.template.as_ref())
    }
}
