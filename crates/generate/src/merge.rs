//! Template merge: a generator's override template combined with the
//! set's base template. Explicitly set override fields always win; base
//! fills the gaps.

use kuset_core::{KustomizationSpec, SetTemplate, TemplateMeta};

/// Merge `override_` over `base`. No override returns a copy of the base.
/// Neither input is mutated.
pub fn merge_template(override_: Option<&SetTemplate>, base: &SetTemplate) -> SetTemplate {
    let Some(over) = override_ else {
        return base.clone();
    };
    let mut merged = over.clone();
    merge_meta(&mut merged.metadata, &base.metadata);
    merge_spec(&mut merged.spec, &base.spec);
    merged
}

fn merge_meta(dest: &mut TemplateMeta, base: &TemplateMeta) {
    if dest.name.is_empty() {
        dest.name = base.name.clone();
    }
    if dest.namespace.is_empty() {
        dest.namespace = base.namespace.clone();
    }
    // maps merge key-wise, override wins per key
    for (k, v) in &base.labels {
        dest.labels.entry(k.clone()).or_insert_with(|| v.clone());
    }
    for (k, v) in &base.annotations {
        dest.annotations.entry(k.clone()).or_insert_with(|| v.clone());
    }
    // finalizers append, deduped, override order first
    for f in &base.finalizers {
        if !dest.finalizers.contains(f) {
            dest.finalizers.push(f.clone());
        }
    }
}

fn merge_spec(dest: &mut KustomizationSpec, base: &KustomizationSpec) {
    fill(&mut dest.interval, &base.interval);
    fill(&mut dest.retry_interval, &base.retry_interval);
    fill(&mut dest.path, &base.path);
    fill(&mut dest.prune, &base.prune);
    fill(&mut dest.source_ref, &base.source_ref);
    fill(&mut dest.target_namespace, &base.target_namespace);
    fill(&mut dest.service_account_name, &base.service_account_name);
    fill(&mut dest.suspend, &base.suspend);
    fill(&mut dest.timeout, &base.timeout);
    fill(&mut dest.wait, &base.wait);
    fill(&mut dest.force, &base.force);
    fill(&mut dest.kube_config, &base.kube_config);
    fill(&mut dest.depends_on, &base.depends_on);
}

fn fill<T: Clone>(dest: &mut Option<T>, base: &Option<T>) {
    if dest.is_none() {
        *dest = base.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuset_core::SourceRef;
    use std::collections::BTreeMap;

    fn base() -> SetTemplate {
        SetTemplate {
            metadata: TemplateMeta {
                name: "{{.cluster}}-demo".to_string(),
                labels: BTreeMap::from([("team".to_string(), "eng".to_string())]),
                finalizers: vec!["finalizers.example.com".to_string()],
                ..Default::default()
            },
            spec: KustomizationSpec {
                interval: Some("5m".to_string()),
                path: Some("/a".to_string()),
                source_ref: Some(SourceRef {
                    kind: "GitRepository".to_string(),
                    name: "demo-repo".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn no_override_returns_base_unchanged() {
        let b = base();
        assert_eq!(merge_template(None, &b), b);
    }

    #[test]
    fn override_wins_and_base_fills_gaps() {
        let over = SetTemplate {
            spec: KustomizationSpec {
                path: Some("/b".to_string()),
                prune: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge_template(Some(&over), &base());
        assert_eq!(merged.spec.path.as_deref(), Some("/b"));
        assert_eq!(merged.spec.prune, Some(true));
        // filled from base
        assert_eq!(merged.spec.interval.as_deref(), Some("5m"));
        assert_eq!(merged.metadata.name, "{{.cluster}}-demo");
        assert_eq!(merged.spec.source_ref.as_ref().unwrap().name, "demo-repo");
    }

    #[test]
    fn labels_merge_key_wise_with_override_winning() {
        let over = SetTemplate {
            metadata: TemplateMeta {
                labels: BTreeMap::from([
                    ("team".to_string(), "platform".to_string()),
                    ("cluster.app/name".to_string(), "{{.cluster}}".to_string()),
                ]),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge_template(Some(&over), &base());
        assert_eq!(merged.metadata.labels["team"], "platform");
        assert_eq!(merged.metadata.labels["cluster.app/name"], "{{.cluster}}");
    }

    #[test]
    fn finalizers_append_without_duplicates() {
        let over = SetTemplate {
            metadata: TemplateMeta {
                finalizers: vec![
                    "other.example.com".to_string(),
                    "finalizers.example.com".to_string(),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge_template(Some(&over), &base());
        assert_eq!(
            merged.metadata.finalizers,
            vec!["other.example.com", "finalizers.example.com"]
        );
    }

    #[test]
    fn explicit_false_survives_the_merge() {
        let mut b = base();
        b.spec.prune = Some(true);
        let over = SetTemplate {
            spec: KustomizationSpec {
                prune: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(merge_template(Some(&over), &b).spec.prune, Some(false));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let b = base();
        let over = SetTemplate::default();
        let before = (over.clone(), b.clone());
        let _ = merge_template(Some(&over), &b);
        assert_eq!((over, b), before);
    }
}
