//! Well-known labels, annotations and naming rules
//!
//! These keys are shared with the operator that creates the cluster
//! objects, so they must stay byte-for-byte stable.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

/// Kind of the resource that owns guarded StatefulSets
pub const CLUSTER_KIND: &str = "TidbCluster";

/// Kind of the workload that owns guarded pods
pub const STATEFULSET_KIND: &str = "StatefulSet";

/// Label carrying the component role of a pod or StatefulSet
pub const COMPONENT_LABEL_KEY: &str = "app.kubernetes.io/component";

/// Label carrying the placement-driver store ID backing a TiKV pod
pub const STORE_ID_LABEL_KEY: &str = "tidb.pingcap.com/store-id";

/// Label the StatefulSet controller stamps with the pod's revision
pub const REVISION_LABEL_KEY: &str = "controller-revision-hash";

/// Pod annotation: when leader eviction for this pod began (RFC 3339)
pub const EVICT_LEADER_BEGIN_TIME_ANNOTATION: &str = "tidb.pingcap.com/evict-leader-begin-time";

/// PVC annotation: claim must outlive its scaled-in pod (RFC 3339)
pub const PVC_DEFER_DELETING_ANNOTATION: &str = "tidb.pingcap.com/pvc-defer-deleting";

/// Cluster annotation protecting TiKV ordinals from a rolling update
pub const TIKV_PARTITION_ANNOTATION: &str = "tidb.pingcap.com/tikv-partition";

/// Cluster annotation protecting TiDB ordinals from a rolling update
pub const TIDB_PARTITION_ANNOTATION: &str = "tidb.pingcap.com/tidb-partition";

/// Controlling owner among `owners`, if it has the expected kind
pub fn controller_of_kind<'a>(
    owners: Option<&'a Vec<OwnerReference>>,
    kind: &str,
) -> Option<&'a OwnerReference> {
    owners?
        .iter()
        .find(|r| r.controller == Some(true))
        .filter(|r| r.kind == kind)
}

/// Component roles this webhook guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    /// Storage node backed by a placement-driver store
    Tikv,
    /// Stateless SQL layer
    Tidb,
}

impl MemberRole {
    /// Read the role from an object's labels
    pub fn from_labels(labels: Option<&BTreeMap<String, String>>) -> Option<Self> {
        match labels?.get(COMPONENT_LABEL_KEY)?.as_str() {
            "tikv" => Some(MemberRole::Tikv),
            "tidb" => Some(MemberRole::Tidb),
            _ => None,
        }
    }

    /// Cluster annotation declaring this role's protected partition
    pub fn partition_annotation(&self) -> &'static str {
        match self {
            MemberRole::Tikv => TIKV_PARTITION_ANNOTATION,
            MemberRole::Tidb => TIDB_PARTITION_ANNOTATION,
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberRole::Tikv => write!(f, "tikv"),
            MemberRole::Tidb => write!(f, "tidb"),
        }
    }
}

/// Parse the ordinal suffix of a StatefulSet pod name (`basic-tikv-3` -> 3)
pub fn ordinal_from_pod_name(name: &str) -> Result<i32> {
    name.rsplit_once('-')
        .map(|(_, suffix)| suffix)
        // `str::parse` alone would take a leading sign
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|suffix| suffix.parse::<i32>().ok())
        .ok_or_else(|| Error::InvalidOrdinal {
            name: name.to_string(),
        })
}

/// Name of the pod at `ordinal` in StatefulSet `set_name`
pub fn ordinal_pod_name(set_name: &str, ordinal: i32) -> String {
    format!("{}-{}", set_name, ordinal)
}

/// Name of the data claim for the pod at `ordinal` in StatefulSet `set_name`
pub fn ordinal_pvc_name(role: MemberRole, set_name: &str, ordinal: i32) -> String {
    format!("{}-{}-{}", role, set_name, ordinal)
}
