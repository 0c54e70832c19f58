//! Marker Store
//!
//! Typed markers persisted as annotations on pods and claims. They carry the
//! progress of multi-request work (leader eviction, scale-in) across retried
//! admission calls and webhook restarts; the webhook itself keeps nothing.

use crate::domain::labels::{EVICT_LEADER_BEGIN_TIME_ANNOTATION, PVC_DEFER_DELETING_ANNOTATION};
use crate::domain::ports::ObjectStoreRef;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::ObjectMeta;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Marker Types
// =============================================================================

/// Leader eviction has been requested for a pod's store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionState {
    /// When the eviction episode began
    pub begin_time: DateTime<Utc>,
}

impl EvictionState {
    /// Read the marker from a pod; a malformed timestamp is an error
    pub fn from_pod(pod: &Pod) -> Result<Option<Self>> {
        read_timestamp(&pod.metadata, EVICT_LEADER_BEGIN_TIME_ANNOTATION, "Pod")
            .map(|ts| ts.map(|begin_time| Self { begin_time }))
    }

    /// Time elapsed since the episode began, zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.begin_time).to_std().unwrap_or(Duration::ZERO)
    }
}

/// A claim must not be reclaimed together with its scaled-in pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredDeletion {
    /// When the claim was first marked
    pub since: DateTime<Utc>,
}

impl DeferredDeletion {
    /// Read the marker from a claim; a malformed timestamp is an error
    pub fn from_pvc(pvc: &PersistentVolumeClaim) -> Result<Option<Self>> {
        read_timestamp(&pvc.metadata, PVC_DEFER_DELETING_ANNOTATION, "PersistentVolumeClaim")
            .map(|ts| ts.map(|since| Self { since }))
    }
}

fn read_timestamp(meta: &ObjectMeta, key: &str, kind: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = meta.annotations.as_ref().and_then(|a| a.get(key)) else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(value)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| Error::InvalidAnnotation {
            object: format!(
                "{}/{}/{}",
                kind,
                meta.namespace.as_deref().unwrap_or_default(),
                meta.name.as_deref().unwrap_or_default()
            ),
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        })
}

fn write_timestamp(meta: &mut ObjectMeta, key: &str, at: DateTime<Utc>) {
    meta.annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), at.to_rfc3339_opts(SecondsFormat::Secs, true));
}

// =============================================================================
// Marker Store
// =============================================================================

/// Reads and writes markers through the object store
#[derive(Clone)]
pub struct MarkerStore {
    objects: ObjectStoreRef,
}

impl MarkerStore {
    /// Create a marker store over the given object store
    pub fn new(objects: ObjectStoreRef) -> Self {
        Self { objects }
    }

    /// Record the start of leader eviction on a pod.
    ///
    /// Returns `false` without writing if the pod already carries a marker,
    /// so an episode keeps its original begin time across retries.
    pub async fn mark_eviction_begun(&self, pod: &Pod, at: DateTime<Utc>) -> Result<bool> {
        if EvictionState::from_pod(pod)?.is_some() {
            debug!(pod = ?pod.metadata.name, "Eviction marker already present");
            return Ok(false);
        }

        let mut updated = pod.clone();
        write_timestamp(&mut updated.metadata, EVICT_LEADER_BEGIN_TIME_ANNOTATION, at);
        self.objects.replace_pod(&updated).await?;

        info!(
            namespace = ?pod.metadata.namespace,
            pod = ?pod.metadata.name,
            begin_time = %at,
            "Recorded leader eviction begin time"
        );
        Ok(true)
    }

    /// Mark a claim as deferred-delete.
    ///
    /// Returns `false` without writing if the claim is already marked.
    pub async fn mark_claim_deferred(
        &self,
        namespace: &str,
        pvc_name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let pvc = self.objects.get_pvc(namespace, pvc_name).await?;
        if DeferredDeletion::from_pvc(&pvc)?.is_some() {
            debug!(namespace, pvc = pvc_name, "Claim already marked for deferred deletion");
            return Ok(false);
        }

        let mut updated = pvc;
        write_timestamp(&mut updated.metadata, PVC_DEFER_DELETING_ANNOTATION, at);
        self.objects.replace_pvc(&updated).await?;

        info!(namespace, pvc = pvc_name, "Marked claim for deferred deletion");
        Ok(true)
    }
}
