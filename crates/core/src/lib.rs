//! kuset core types: the KustomizationSet resource, templates, and the
//! generated Kustomization shape.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod conditions;
pub mod inventory;

pub use conditions::{Condition, READY_CONDITION};
pub use inventory::{ObjMetadata, ResourceInventory, ResourceRef};

/// One parameter record: a key→value mapping driving one template instantiation.
pub type ParamRecord = serde_json::Map<String, serde_json::Value>;

/// API version of the Kustomizations this controller generates.
pub const KUSTOMIZATION_API_VERSION: &str = "kustomize.toolkit.fluxcd.io/v1beta2";
pub const KUSTOMIZATION_GROUP: &str = "kustomize.toolkit.fluxcd.io";
pub const KUSTOMIZATION_KIND: &str = "Kustomization";

/// Desired state of a KustomizationSet: an ordered list of generator
/// entries plus one base template.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sets.gitops.solutions",
    version = "v1alpha1",
    kind = "KustomizationSet",
    namespaced,
    status = "KustomizationSetStatus",
    shortname = "kset"
)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSetSpec {
    pub generators: Vec<SetGenerator>,
    pub template: SetTemplate,
}

/// Observed state: the inventory of generated resources plus a health
/// condition, both wholesale-replaced on every successful pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<ResourceInventory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// One generator entry. Each sub-structure that is present activates the
/// corresponding generator kind; more than one may be active at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetGenerator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repository: Option<GitRepositoryGenerator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestGenerator>,
}

/// The known generator kinds. Dispatch on this is always an exhaustive
/// match, so adding a kind forces every call site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    List,
    GitRepository,
    PullRequest,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::List => "List",
            GeneratorKind::GitRepository => "GitRepository",
            GeneratorKind::PullRequest => "PullRequest",
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SetGenerator {
    /// Kinds activated by this entry, in a fixed order.
    pub fn active_kinds(&self) -> Vec<GeneratorKind> {
        let mut kinds = Vec::new();
        if self.list.is_some() {
            kinds.push(GeneratorKind::List);
        }
        if self.git_repository.is_some() {
            kinds.push(GeneratorKind::GitRepository);
        }
        if self.pull_request.is_some() {
            kinds.push(GeneratorKind::PullRequest);
        }
        kinds
    }
}

/// Static inline list of parameter records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListGenerator {
    pub elements: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SetTemplate>,
}

/// Generates one record per file under the selected directories of a
/// GitRepository artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryGenerator {
    /// Name of a GitRepository resource in the same namespace as the set.
    pub repository_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<GitRepositoryGeneratorItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SetTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryGeneratorItem {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
}

/// Generates one record per open pull request against a repository.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestGenerator {
    /// Hosting driver, e.g. "github".
    pub driver: String,
    #[serde(default, rename = "serverURL", skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Repository in "owner/name" form.
    pub repo: String,
    /// Minimum re-poll interval; hosting APIs cannot be watched.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub interval: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
    /// Keep only pull requests carrying at least one of these labels;
    /// empty means no filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<SetTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Template for generated Kustomizations, split into placeholder-bearing
/// metadata and the generated payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetTemplate {
    #[serde(default)]
    pub metadata: TemplateMeta,
    #[serde(default)]
    pub spec: KustomizationSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

/// Typed subset of the Flux Kustomization spec. Interval-like fields are
/// opaque strings passed through to the generated resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<KubeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<DependencyRef>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfig {
    pub secret_ref: SecretKeyReference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// ---- generated resource ----

/// One fully rendered Kustomization, transient until submitted to the
/// resource store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    pub api_version: String,
    pub kind: String,
    pub metadata: ResourceMeta,
    pub spec: KustomizationSpec,
}

impl Kustomization {
    /// Build an unrendered Kustomization from a merged template.
    pub fn from_template(template: &SetTemplate) -> Self {
        let meta = &template.metadata;
        Kustomization {
            api_version: KUSTOMIZATION_API_VERSION.to_string(),
            kind: KUSTOMIZATION_KIND.to_string(),
            metadata: ResourceMeta {
                name: meta.name.clone(),
                namespace: if meta.namespace.is_empty() {
                    None
                } else {
                    Some(meta.namespace.clone())
                },
                labels: meta.labels.clone(),
                annotations: meta.annotations.clone(),
                finalizers: meta.finalizers.clone(),
                owner_references: Vec::new(),
            },
            spec: template.spec.clone(),
        }
    }

    /// Identity of this resource inside an inventory.
    pub fn object_ref(&self) -> ObjMetadata {
        ObjMetadata {
            namespace: self.metadata.namespace.clone().unwrap_or_default(),
            name: self.metadata.name.clone(),
            group: KUSTOMIZATION_GROUP.to_string(),
            kind: KUSTOMIZATION_KIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_kinds_reports_every_present_sub_generator() {
        let entry = SetGenerator {
            list: Some(ListGenerator::default()),
            pull_request: None,
            git_repository: Some(GitRepositoryGenerator::default()),
        };
        assert_eq!(
            entry.active_kinds(),
            vec![GeneratorKind::List, GeneratorKind::GitRepository]
        );
        assert!(SetGenerator::default().active_kinds().is_empty());
    }

    #[test]
    fn pull_request_generator_parses_human_intervals() {
        let raw = serde_json::json!({
            "driver": "github",
            "repo": "example/repo",
            "interval": "5m",
        });
        let pr: PullRequestGenerator = serde_json::from_value(raw).unwrap();
        assert_eq!(pr.interval, Duration::from_secs(300));
    }

    #[test]
    fn kustomization_from_template_keeps_metadata_and_spec() {
        let template = SetTemplate {
            metadata: TemplateMeta {
                name: "{{.cluster}}-demo".to_string(),
                namespace: "default".to_string(),
                labels: BTreeMap::from([("team".to_string(), "eng".to_string())]),
                ..Default::default()
            },
            spec: KustomizationSpec {
                interval: Some("5m".to_string()),
                path: Some("./clusters/{{.cluster}}/".to_string()),
                prune: Some(true),
                ..Default::default()
            },
        };
        let k = Kustomization::from_template(&template);
        assert_eq!(k.api_version, KUSTOMIZATION_API_VERSION);
        assert_eq!(k.kind, KUSTOMIZATION_KIND);
        assert_eq!(k.metadata.name, "{{.cluster}}-demo");
        assert_eq!(k.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(k.spec.path.as_deref(), Some("./clusters/{{.cluster}}/"));
    }

    #[test]
    fn empty_template_namespace_serializes_as_absent() {
        let k = Kustomization::from_template(&SetTemplate::default());
        let v = serde_json::to_value(&k).unwrap();
        assert!(v["metadata"].get("namespace").is_none());
    }
}
