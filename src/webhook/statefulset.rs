//! Rolling-Update Partition Guard
//!
//! Refuses StatefulSet updates that would move the rolling-update partition
//! into the range an operator protected on the owning cluster.

use super::Verdict;
use crate::adapters::k8s::{ADVANCED_STATEFULSET_GROUP, STATEFULSET_GROUP};
use crate::domain::labels::{controller_of_kind, MemberRole, CLUSTER_KIND};
use crate::domain::ports::ObjectStoreRef;
use crate::error::Result;
use kube::api::DynamicObject;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatefulSetSpecView {
    #[serde(default)]
    update_strategy: UpdateStrategyView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStrategyView {
    #[serde(default)]
    rolling_update: Option<RollingUpdateView>,
}

#[derive(Debug, Default, Deserialize)]
struct RollingUpdateView {
    #[serde(default)]
    partition: Option<i32>,
}

/// Rolling-update partition of a StatefulSet object, `0` when unset
pub fn partition_of(obj: &DynamicObject) -> Result<i32> {
    let spec = match obj.data.get("spec") {
        Some(raw) => StatefulSetSpecView::deserialize(raw)?,
        None => StatefulSetSpecView::default(),
    };
    Ok(spec
        .update_strategy
        .rolling_update
        .and_then(|r| r.partition)
        .unwrap_or(0))
}

/// Whether moving to `requested` leaves every protected ordinal untouched
pub fn check_partition(requested: i32, protected: i32) -> bool {
    !(0 < requested && requested <= protected)
}

/// Validates partition changes against the owning cluster's protection
#[derive(Clone)]
pub struct PartitionGuard {
    objects: ObjectStoreRef,
    group: &'static str,
}

impl PartitionGuard {
    pub fn new(objects: ObjectStoreRef, advanced_statefulset: bool) -> Self {
        let group = if advanced_statefulset {
            ADVANCED_STATEFULSET_GROUP
        } else {
            STATEFULSET_GROUP
        };
        Self { objects, group }
    }

    /// Decide whether an update of a StatefulSet in API group `group` from
    /// `old` to `new` may proceed.
    ///
    /// Ownership and labels are read from `old`, since that is what the
    /// cluster has persisted; the requested partition comes from `new`.
    pub async fn admit_update(
        &self,
        group: &str,
        old: &DynamicObject,
        new: Option<&DynamicObject>,
    ) -> Result<Verdict> {
        let name = old.metadata.name.clone().unwrap_or_default();
        let namespace = old.metadata.namespace.clone().unwrap_or_default();

        // The controller only rolls StatefulSets of the configured group, so
        // the other flavor is not ours to guard
        if group != self.group {
            warn!(
                namespace = %namespace,
                statefulset = %name,
                group,
                expected = self.group,
                "StatefulSet update from unguarded API group, allowing"
            );
            return Ok(Verdict::Allowed);
        }

        let Some(role) = MemberRole::from_labels(old.metadata.labels.as_ref()) else {
            return Ok(Verdict::Allowed);
        };
        let Some(owner) = controller_of_kind(old.metadata.owner_references.as_ref(), CLUSTER_KIND)
        else {
            debug!(namespace = %namespace, statefulset = %name, "StatefulSet not owned by a cluster");
            return Ok(Verdict::Allowed);
        };

        let cluster = self.objects.get_cluster(&namespace, &owner.name).await?;
        let Some(protected) = cluster.protected_partition(role)? else {
            return Ok(Verdict::Allowed);
        };

        let current = partition_of(old)?;
        let requested = match new {
            Some(obj) => partition_of(obj)?,
            None => 0,
        };

        info!(
            namespace = %namespace,
            statefulset = %name,
            %role,
            current,
            requested,
            protected,
            "Partition update requested"
        );

        if check_partition(requested, protected) {
            Ok(Verdict::Allowed)
        } else {
            Ok(Verdict::denied(format!(
                "{} partition {} would update ordinals protected by {}={} on cluster {}",
                role,
                requested,
                role.partition_annotation(),
                protected,
                owner.name
            )))
        }
    }
}
