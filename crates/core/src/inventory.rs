//! Inventory of generated resources: the recorded set of resource
//! references a KustomizationSet currently owns.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sorted set of references to the resources generated on the last
/// successful pass. Its prior value is the only signal used to detect
/// removals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceInventory {
    pub entries: Vec<ResourceRef>,
}

impl ResourceInventory {
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }
}

/// Reference to one generated resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRef {
    /// Stable encoding of the resource identity, in the format
    /// `<namespace>_<name>_<group>_<kind>`.
    pub id: String,
    /// API version of the resource's kind.
    #[serde(rename = "v")]
    pub version: String,
}

/// Decoded identity of one generated resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjMetadata {
    pub namespace: String,
    pub name: String,
    pub group: String,
    pub kind: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid resource id {0:?}: want <namespace>_<name>_<group>_<kind>")]
pub struct InvalidResourceId(pub String);

impl std::fmt::Display for ObjMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.namespace, self.name, self.group, self.kind
        )
    }
}

impl std::str::FromStr for ObjMetadata {
    type Err = InvalidResourceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        match parts.as_slice() {
            [namespace, name, group, kind] if !name.is_empty() && !kind.is_empty() => {
                Ok(ObjMetadata {
                    namespace: (*namespace).to_string(),
                    name: (*name).to_string(),
                    group: (*group).to_string(),
                    kind: (*kind).to_string(),
                })
            }
            _ => Err(InvalidResourceId(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips() {
        let id = ObjMetadata {
            namespace: "default".to_string(),
            name: "engineering-dev-demo".to_string(),
            group: "kustomize.toolkit.fluxcd.io".to_string(),
            kind: "Kustomization".to_string(),
        };
        let s = id.to_string();
        assert_eq!(
            s,
            "default_engineering-dev-demo_kustomize.toolkit.fluxcd.io_Kustomization"
        );
        assert_eq!(s.parse::<ObjMetadata>().unwrap(), id);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["", "a_b_c", "a_b_c_d_e", "ns__group_Kind"] {
            assert!(bad.parse::<ObjMetadata>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn inventory_contains_by_id() {
        let inv = ResourceInventory {
            entries: vec![ResourceRef {
                id: "default_x_g_K".to_string(),
                version: "g/v1".to_string(),
            }],
        };
        assert!(inv.contains("default_x_g_K"));
        assert!(!inv.contains("default_y_g_K"));
    }

    #[test]
    fn resource_ref_serializes_version_as_v() {
        let r = ResourceRef {
            id: "default_x_g_K".to_string(),
            version: "g/v1".to_string(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["v"], "g/v1");
    }
}
