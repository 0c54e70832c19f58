//! Leader Eviction Coordinator
//!
//! Starts moving region leaders off a store before its pod is recreated, and
//! tells the deletion engine when the store has drained. The wait happens
//! across admission retries, never inside a request.

use crate::domain::markers::{EvictionState, MarkerStore};
use crate::domain::ports::{PlacementClient, StoreInfo};
use crate::error::Result;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;
use tracing::{info, warn};

/// A store is ready once it leads nothing, or once eviction has run longer
/// than `timeout` so a stuck transfer cannot block the upgrade forever
pub fn eviction_ready(leader_count: u64, age: Duration, timeout: Duration) -> bool {
    leader_count == 0 || age > timeout
}

/// Coordinates leader eviction through the placement driver and pod markers
#[derive(Clone)]
pub struct LeaderEvictionCoordinator {
    markers: MarkerStore,
}

impl LeaderEvictionCoordinator {
    pub fn new(markers: MarkerStore) -> Self {
        Self { markers }
    }

    /// Begin leader eviction for the store backing `pod`.
    ///
    /// No-op if the pod already carries an eviction marker. Otherwise the
    /// transfer is requested first and the marker written second; a failed
    /// marker write is only logged, since the next retry repeats both steps
    /// and a duplicate transfer request is harmless.
    ///
    /// Returns `true` if a transfer was requested by this call.
    pub async fn begin_eviction(
        &self,
        pod: &Pod,
        store_id: u64,
        placement: &dyn PlacementClient,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if EvictionState::from_pod(pod)?.is_some() {
            return Ok(false);
        }

        placement.begin_evict_leader(store_id).await?;
        info!(pod = ?pod.metadata.name, store_id, "Began leader eviction");

        if let Err(e) = self.markers.mark_eviction_begun(pod, now).await {
            warn!(
                pod = ?pod.metadata.name,
                store_id,
                conflict = e.is_conflict(),
                error = %e,
                "Failed to record eviction begin time, will retry on next request"
            );
        }
        Ok(true)
    }

    /// Whether the store backing `pod` has finished eviction.
    ///
    /// `false` if eviction never began.
    pub fn is_ready(
        pod: &Pod,
        store: &StoreInfo,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(EvictionState::from_pod(pod)?
            .map(|state| eviction_ready(store.leader_count, state.age(now), timeout))
            .unwrap_or(false))
    }
}
