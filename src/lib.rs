//! TiKV Safety Webhook
//!
//! A validating admission webhook that keeps a TiDB cluster's storage layer
//! safe while Kubernetes deletes pods and rolls StatefulSets.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Admission Gateway                           │
//! │                 POST /admit  →  route by resource/op                 │
//! ├───────────────────────────────────┬──────────────────────────────────┤
//! │      Pod Deletion Guard           │      Partition Guard             │
//! │  classify → decide → side effect  │  old labels/owner → annotation   │
//! │  (eviction, store removal, PVC)   │  → requested partition check     │
//! ├───────────────────────────────────┴──────────────────────────────────┤
//! │                            Domain Ports                              │
//! │        PlacementClient (PD)          ObjectStore (API server)        │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                             Adapters                                 │
//! │        PdClient (reqwest)            KubeObjectStore (kube)          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`webhook`]: Admission checks, gateway and HTTP server
//! - [`adapters`]: Placement driver and Kubernetes implementations of the ports
//! - [`crd`]: The TidbCluster custom resource
//! - [`domain`]: Port traits, markers and naming rules
//! - [`metrics`]: Admission metrics
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod crd;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod webhook;

// Re-export commonly used types
pub use adapters::{KubeObjectStore, PdClient, PdClientFactory, PdConfig};

pub use crd::{ComponentSpec, TidbCluster, TidbClusterSpec};

pub use domain::ports::{
    ObjectStore, PlacementClient, PlacementClientFactory, StatefulSetInfo, StoreInfo,
    StoreState,
};
pub use domain::{DeferredDeletion, EvictionState, MarkerStore, MemberRole};

pub use error::{Error, Result};

pub use metrics::{AdmissionMetrics, AdmissionOutcome};

pub use webhook::{
    AdmissionConfig, AdmissionGateway, PartitionGuard, PodDeletionGuard, Verdict, WebhookServer,
    WebhookServerConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
