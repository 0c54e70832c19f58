//! Domain Ports - Core trait definitions for the safety webhook
//!
//! These traits define the boundaries between the admission logic and the
//! external systems it consults: the placement driver that owns store state,
//! and the Kubernetes API server that owns pods, claims and clusters.

use crate::crd::TidbCluster;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::sync::Arc;

// =============================================================================
// Store Types
// =============================================================================

/// Lifecycle state of a store as reported by the placement driver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreState {
    Up,
    Offline,
    Down,
    Tombstone,
    /// Any state name this webhook does not know how to reason about
    Unknown(String),
}

impl StoreState {
    /// Parse a placement driver state name
    pub fn from_state_name(name: &str) -> Self {
        match name {
            "Up" => StoreState::Up,
            "Offline" => StoreState::Offline,
            "Down" => StoreState::Down,
            "Tombstone" => StoreState::Tombstone,
            other => StoreState::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreState::Up => write!(f, "Up"),
            StoreState::Offline => write!(f, "Offline"),
            StoreState::Down => write!(f, "Down"),
            StoreState::Tombstone => write!(f, "Tombstone"),
            StoreState::Unknown(name) => write!(f, "{}", name),
        }
    }
}

/// A store as seen for the lifetime of one admission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Store ID assigned by the placement driver
    pub id: u64,
    /// Advertised address of the store
    pub address: String,
    /// Current lifecycle state
    pub state: StoreState,
    /// Number of regions this store currently leads
    pub leader_count: u64,
}

// =============================================================================
// StatefulSet View
// =============================================================================

/// The parts of an owning StatefulSet the deletion engine needs.
///
/// Read through a dynamic API so the same view serves both the built-in
/// `apps/v1` StatefulSet and the advanced StatefulSet from `apps.pingcap.com`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatefulSetInfo {
    pub name: String,
    pub namespace: String,
    /// Desired replica count (`spec.replicas`)
    pub replicas: i32,
    /// Revision that pods converge to (`status.updateRevision`)
    pub update_revision: Option<String>,
    /// Controlling owner reference, if any
    pub controller: Option<OwnerReference>,
}

// =============================================================================
// Placement Driver Port
// =============================================================================

/// Port for the placement driver of one storage cluster
#[async_trait]
pub trait PlacementClient: Send + Sync {
    /// List all stores known to the placement driver
    async fn get_stores(&self) -> Result<Vec<StoreInfo>>;

    /// Get a single store, failing with `Error::StoreNotFound` if unknown
    async fn get_store(&self, store_id: u64) -> Result<StoreInfo>;

    /// Begin decommissioning a store
    async fn delete_store(&self, store_id: u64) -> Result<()>;

    /// Begin moving all region leaders away from a store
    async fn begin_evict_leader(&self, store_id: u64) -> Result<()>;
}

/// Resolves the placement driver client for a given cluster
pub trait PlacementClientFactory: Send + Sync {
    /// Get the client for cluster `name` in `namespace`
    fn client_for(&self, namespace: &str, name: &str) -> Result<PlacementClientRef>;
}

// =============================================================================
// Object Store Port
// =============================================================================

/// Port for reads and optimistic writes against the Kubernetes API server
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Replace a pod; fails on resourceVersion conflict
    async fn replace_pod(&self, pod: &Pod) -> Result<Pod>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim>;

    /// Replace a claim; fails on resourceVersion conflict
    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim>;

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSetInfo>;

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TidbCluster>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type PlacementClientRef = Arc<dyn PlacementClient>;
pub type PlacementClientFactoryRef = Arc<dyn PlacementClientFactory>;
pub type ObjectStoreRef = Arc<dyn ObjectStore>;
