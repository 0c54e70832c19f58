//! Deletion Decision Engine
//!
//! Gathers the facts about a TiKV pod about to be deleted, runs them through
//! the decision table and carries out the side effect the table names. Every
//! "not yet" is an immediate deny; the caller's retry loop drives progress.

use super::classifier::{classify, store_id_of, ClassifiedStore};
use super::decision::{decide, Decision, DeletionFacts};
use super::eviction::LeaderEvictionCoordinator;
use super::{AdmissionConfig, Verdict};
use crate::domain::labels::{
    controller_of_kind, ordinal_from_pod_name, ordinal_pod_name, ordinal_pvc_name, MemberRole,
    CLUSTER_KIND, REVISION_LABEL_KEY, STATEFULSET_KIND,
};
use crate::domain::markers::{EvictionState, MarkerStore};
use crate::domain::ports::{
    ObjectStoreRef, PlacementClient, PlacementClientFactoryRef, StatefulSetInfo, StoreInfo,
    StoreState,
};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

fn revision_of(pod: &Pod) -> Option<&str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(REVISION_LABEL_KEY))
        .map(String::as_str)
}

/// A pod is upgrading when it has not converged to the update revision.
///
/// A pod without a revision label is treated as upgrading. A StatefulSet
/// with no recorded update revision has no rollout to be part of.
pub fn is_upgrading(pod: &Pod, set: &StatefulSetInfo) -> bool {
    match (revision_of(pod), set.update_revision.as_deref()) {
        (None, _) => true,
        (Some(current), Some(update)) => current != update,
        (Some(_), None) => false,
    }
}

/// Guards deletion of TiKV pods
#[derive(Clone)]
pub struct PodDeletionGuard {
    objects: ObjectStoreRef,
    placement: PlacementClientFactoryRef,
    markers: MarkerStore,
    eviction: LeaderEvictionCoordinator,
    config: AdmissionConfig,
}

impl PodDeletionGuard {
    pub fn new(
        objects: ObjectStoreRef,
        placement: PlacementClientFactoryRef,
        config: AdmissionConfig,
    ) -> Self {
        let markers = MarkerStore::new(objects.clone());
        Self {
            objects,
            placement,
            eviction: LeaderEvictionCoordinator::new(markers.clone()),
            markers,
            config,
        }
    }

    /// Decide whether pod `name` in `namespace` may be deleted at `now`
    pub async fn admit_delete(
        &self,
        namespace: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        let pod = match self.objects.get_pod(namespace, name).await {
            Ok(pod) => pod,
            Err(Error::ResourceNotFound { .. }) => {
                debug!(namespace, pod = name, "Pod already gone");
                return Ok(Verdict::Allowed);
            }
            Err(e) => return Err(e),
        };

        if MemberRole::from_labels(pod.metadata.labels.as_ref()) != Some(MemberRole::Tikv) {
            return Ok(Verdict::Allowed);
        }

        let Some(set_ref) =
            controller_of_kind(pod.metadata.owner_references.as_ref(), STATEFULSET_KIND)
        else {
            debug!(namespace, pod = name, "TiKV pod not controlled by a StatefulSet");
            return Ok(Verdict::Allowed);
        };
        let set = self.objects.get_statefulset(namespace, &set_ref.name).await?;

        let Some(cluster_ref) = set.controller.as_ref().filter(|r| r.kind == CLUSTER_KIND) else {
            debug!(namespace, pod = name, statefulset = %set.name, "StatefulSet not owned by a cluster");
            return Ok(Verdict::Allowed);
        };

        let placement = self.placement.client_for(namespace, &cluster_ref.name)?;
        self.admit_tikv_delete(&pod, &set, placement.as_ref(), now).await
    }

    /// Run the decision table for a TiKV pod whose owners are resolved
    pub async fn admit_tikv_delete(
        &self,
        pod: &Pod,
        set: &StatefulSetInfo,
        placement: &dyn PlacementClient,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let namespace = set.namespace.as_str();

        let ordinal = ordinal_from_pod_name(&name)?;
        let classified = classify(pod, placement).await?;
        let eviction = EvictionState::from_pod(pod)?;

        let facts = DeletionFacts {
            store: classified.class(),
            ordinal_in_range: ordinal < set.replicas,
            upgrading: is_upgrading(pod, set),
            eviction_age: eviction.map(|state| state.age(now)),
            leader_count: classified.store().map(|s| s.leader_count).unwrap_or(0),
        };

        if facts.needs_upgrade_order_check() {
            let stores = placement.get_stores().await?;
            self.check_upgrade_order(set, ordinal, &stores).await?;
        }

        let decision = decide(&facts, self.config.evict_leader_timeout);
        info!(
            namespace,
            pod = %name,
            store = %facts.store,
            ordinal,
            replicas = set.replicas,
            upgrading = facts.upgrading,
            leader_count = facts.leader_count,
            ?decision,
            "Evaluated TiKV pod deletion"
        );

        match decision {
            Decision::Allow => Ok(Verdict::Allowed),
            Decision::DeferClaimThenAllow => {
                let pvc = ordinal_pvc_name(MemberRole::Tikv, &set.name, ordinal);
                self.markers.mark_claim_deferred(namespace, &pvc, now).await?;
                Ok(Verdict::Allowed)
            }
            Decision::RemoveStoreThenDeny => {
                let store = up_store(&classified)?;
                placement.delete_store(store.id).await?;
                Ok(Verdict::denied(format!(
                    "pod {} is out of range, store {} removal requested",
                    name, store.id
                )))
            }
            Decision::BeginEvictionThenDeny => {
                let store = up_store(&classified)?;
                self.eviction
                    .begin_eviction(pod, store.id, placement, now)
                    .await?;
                Ok(Verdict::denied(format!(
                    "leader eviction started for store {} of pod {}",
                    store.id, name
                )))
            }
            Decision::Deny(reason) => Ok(Verdict::denied(format!("pod {}: {}", name, reason))),
        }
    }

    /// Only one TiKV ordinal may be mid-upgrade at a time: every pod below
    /// `ordinal` (and above it, if configured) that already runs the update
    /// revision must be backed by a store the placement driver reports Up.
    async fn check_upgrade_order(
        &self,
        set: &StatefulSetInfo,
        ordinal: i32,
        stores: &[StoreInfo],
    ) -> Result<()> {
        let higher = if self.config.verify_higher_ordinals {
            (ordinal + 1)..set.replicas
        } else {
            0..0
        };

        for i in (0..ordinal).chain(higher) {
            let pod_name = ordinal_pod_name(&set.name, i);
            let former = match self.objects.get_pod(&set.namespace, &pod_name).await {
                Ok(p) => p,
                Err(Error::ResourceNotFound { .. }) => {
                    return Err(Error::UpgradeOrderViolated(format!(
                        "pod {}/{} does not exist",
                        set.namespace, pod_name
                    )));
                }
                Err(e) => return Err(e),
            };

            let Some(revision) = revision_of(&former) else {
                return Err(Error::UpgradeOrderViolated(format!(
                    "pod {}/{} has no {} label",
                    set.namespace, pod_name, REVISION_LABEL_KEY
                )));
            };
            if set.update_revision.as_deref() != Some(revision) {
                continue;
            }

            let Some(store_id) = store_id_of(&former)? else {
                return Err(Error::UpgradeOrderViolated(format!(
                    "upgraded pod {}/{} has no store yet",
                    set.namespace, pod_name
                )));
            };
            match stores.iter().find(|s| s.id == store_id) {
                Some(s) if s.state == StoreState::Up => {}
                Some(s) => {
                    return Err(Error::UpgradeOrderViolated(format!(
                        "store {} of upgraded pod {}/{} is {}",
                        store_id, set.namespace, pod_name, s.state
                    )));
                }
                None => {
                    return Err(Error::UpgradeOrderViolated(format!(
                        "store {} of upgraded pod {}/{} is not registered",
                        store_id, set.namespace, pod_name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn up_store(classified: &ClassifiedStore) -> Result<&StoreInfo> {
    match classified {
        ClassifiedStore::Up(store) => Ok(store),
        other => Err(Error::Internal(format!(
            "expected an Up store, classified as {}",
            other.class()
        ))),
    }
}
