//! Parameter generators and the generation pipeline.
//!
//! Each generator turns one entry of a KustomizationSet into a list of
//! parameter records; the pipeline merges templates, renders one
//! Kustomization per record and concatenates the results in declaration
//! order.

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use kuset_core::{GeneratorKind, KustomizationSet, ParamRecord, SetGenerator, SetTemplate};

pub mod git_repository;
pub mod list;
pub mod merge;
pub mod pipeline;
pub mod pull_request;
pub mod render;
pub mod scm;

pub use merge::merge_template;
pub use pipeline::{generate_kustomizations, minimum_interval};
pub use render::render_kustomization;

/// Interface implemented by all generators.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Interpret the entry and produce all parameter records for the
    /// template. `Ok(None)` means the entry does not configure this
    /// generator kind, a legitimate non-error outcome.
    async fn generate(
        &self,
        entry: &SetGenerator,
        set: &KustomizationSet,
    ) -> Result<Option<Vec<ParamRecord>>>;

    /// Minimum re-poll interval, for generators whose source cannot be
    /// watched. When several generators report one, the scheduler uses
    /// the minimum.
    fn interval(&self, entry: &SetGenerator) -> Option<Duration>;

    /// The entry's inline template override, if any.
    fn template<'a>(&self, entry: &'a SetGenerator) -> Option<&'a SetTemplate>;
}

/// All known generators, constructed once at startup and passed
/// explicitly into the pipeline.
pub struct Registry {
    list: list::ListGenerator,
    git_repository: git_repository::GitRepositoryGenerator,
    pull_request: pull_request::PullRequestGenerator,
}

impl Registry {
    pub fn new(
        store: std::sync::Arc<dyn kuset_store::ResourceStore>,
        fetcher: std::sync::Arc<kuset_fetch::ArchiveFetcher>,
        scm_factory: scm::ScmFactory,
    ) -> Self {
        Registry {
            list: list::ListGenerator::new(),
            git_repository: git_repository::GitRepositoryGenerator::new(store.clone(), fetcher),
            pull_request: pull_request::PullRequestGenerator::new(store, scm_factory),
        }
    }

    pub fn generator(&self, kind: GeneratorKind) -> &dyn Generator {
        match kind {
            GeneratorKind::List => &self.list,
            GeneratorKind::GitRepository => &self.git_repository,
            GeneratorKind::PullRequest => &self.pull_request,
        }
    }
}
