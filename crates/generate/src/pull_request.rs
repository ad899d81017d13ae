//! PullRequest generator: one record per open pull request against a
//! configured repository.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::Value;
use tracing::info;

use kuset_core::{KustomizationSet, ParamRecord, SetGenerator, SetTemplate};
use kuset_store::{ResourceKey, ResourceStore};

use crate::scm::{PullRequest, ScmFactory};
use crate::Generator;

pub struct PullRequestGenerator {
    store: Arc<dyn ResourceStore>,
    factory: ScmFactory,
}

impl PullRequestGenerator {
    pub fn new(store: Arc<dyn ResourceStore>, factory: ScmFactory) -> Self {
        PullRequestGenerator { store, factory }
    }
}

#[async_trait]
impl Generator for PullRequestGenerator {
    async fn generate(
        &self,
        entry: &SetGenerator,
        set: &KustomizationSet,
    ) -> Result<Option<Vec<ParamRecord>>> {
        let Some(config) = entry.pull_request.as_ref() else {
            return Ok(None);
        };

        let namespace = set.metadata.namespace.clone().unwrap_or_default();
        let mut token = String::new();
        if let Some(secret_ref) = &config.secret_ref {
            let key = ResourceKey::new(&namespace, &secret_ref.name, "Secret");
            let secret = self
                .store
                .get(&key)
                .await
                .and_then(|s| s.ok_or_else(|| anyhow!("secret {key} not found")))
                .context("failed to load repository generator credentials")?;
            token = secret_password(&secret)
                .context("failed to load repository generator credentials")?;
        }

        info!(repo = %config.repo, driver = %config.driver, "querying pull requests");
        let client = (self.factory)(&config.driver, config.server_url.as_deref(), &token)
            .context("failed to create pull request client")?;
        let prs = client
            .list_open(&config.repo)
            .await
            .with_context(|| format!("failed to list pull requests for {}", config.repo))?;
        info!(repo = %config.repo, count = prs.len(), "queried pull requests");

        let records = prs
            .into_iter()
            .filter(|pr| matches_labels(pr, &config.labels))
            .map(|pr| {
                let mut record = ParamRecord::new();
                record.insert("number".to_string(), Value::String(pr.number.to_string()));
                record.insert("branch".to_string(), Value::String(pr.branch));
                record.insert("head_sha".to_string(), Value::String(pr.head_sha));
                record
            })
            .collect();
        Ok(Some(records))
    }

    fn interval(&self, entry: &SetGenerator) -> Option<Duration> {
        entry.pull_request.as_ref().map(|c| c.interval)
    }

    fn template<'a>(&self, entry: &'a SetGenerator) -> Option<&'a SetTemplate> {
        entry.pull_request.as_ref().and_then(|c| c.template.as_ref())
    }
}

/// An empty filter keeps everything; otherwise the PR must carry at least
/// one of the configured labels.
fn matches_labels(pr: &PullRequest, labels: &[String]) -> bool {
    labels.is_empty() || pr.labels.iter().any(|l| labels.contains(l))
}

/// Token lookup following the standard flux Git repository secret layout:
/// the token lives under `data.password`, base64-encoded.
fn secret_password(secret: &Value) -> Result<String> {
    let encoded = secret
        .pointer("/data/password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("credentials secret has no password entry"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("decoding credentials secret")?;
    String::from_utf8(bytes).context("credentials secret is not valid UTF-8")
}
