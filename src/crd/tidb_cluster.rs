//! TidbCluster CRD
//!
//! The parent resource that owns the TiKV and TiDB StatefulSets. The webhook
//! only reads it: its identity resolves the placement driver endpoint, and its
//! annotations carry the per-role partition protection.

use crate::domain::labels::MemberRole;
use crate::error::{Error, Result};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// TidbCluster CRD
// =============================================================================

/// TidbCluster describes a TiDB cluster made of a placement driver, TiKV
/// storage nodes and TiDB SQL nodes.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "TidbCluster",
    plural = "tidbclusters",
    shortname = "tc",
    printcolumn = r#"{"name": "PD", "type": "integer", "jsonPath": ".spec.pd.replicas"}"#,
    printcolumn = r#"{"name": "TiKV", "type": "integer", "jsonPath": ".spec.tikv.replicas"}"#,
    printcolumn = r#"{"name": "TiDB", "type": "integer", "jsonPath": ".spec.tidb.replicas"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterSpec {
    /// Placement driver members
    #[serde(default)]
    pub pd: ComponentSpec,

    /// Storage members
    #[serde(default)]
    pub tikv: ComponentSpec,

    /// SQL members
    #[serde(default)]
    pub tidb: ComponentSpec,
}

/// Settings shared by every component
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Desired member count
    #[serde(default)]
    pub replicas: i32,

    /// Container image
    #[serde(default)]
    pub image: Option<String>,
}

impl TidbCluster {
    /// Protected partition declared for `role`, if any.
    ///
    /// An annotation that is present but not a non-negative integer is an
    /// error: an operator who wrote a protection must never be silently ignored.
    pub fn protected_partition(&self, role: MemberRole) -> Result<Option<i32>> {
        let key = role.partition_annotation();
        let Some(raw) = self.annotations().get(key) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let invalid = |reason: String| Error::InvalidAnnotation {
            object: format!(
                "TidbCluster/{}/{}",
                self.namespace().unwrap_or_default(),
                self.name_any()
            ),
            key: key.to_string(),
            value: raw.clone(),
            reason,
        };

        let partition = raw.trim().parse::<i32>().map_err(|e| invalid(e.to_string()))?;
        if partition < 0 {
            return Err(invalid("partition must not be negative".into()));
        }
        Ok(Some(partition))
    }
}
