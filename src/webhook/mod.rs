//! Admission Safety Layer
//!
//! Guards two kinds of mutation against a TiDB cluster:
//! - TiKV pod deletion, allowed only when it cannot lose data or leadership
//! - StatefulSet partition changes, blocked below an operator-declared floor

pub mod classifier;
pub mod decision;
pub mod eviction;
pub mod gateway;
pub mod pod;
pub mod server;
pub mod statefulset;

pub use classifier::{classify, ClassifiedStore};
pub use decision::{decide, Decision, DeletionFacts, DenyReason, StoreClass};
pub use eviction::LeaderEvictionCoordinator;
pub use gateway::AdmissionGateway;
pub use pod::PodDeletionGuard;
pub use server::{WebhookServer, WebhookServerConfig};
pub use statefulset::PartitionGuard;

use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the admission checks
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// How long leader eviction may run before a pod is released anyway
    pub evict_leader_timeout: Duration,
    /// Guard `apps.pingcap.com` StatefulSets instead of `apps/v1`
    pub advanced_statefulset: bool,
    /// Also require upgraded pods above the deleted ordinal to be healthy
    pub verify_higher_ordinals: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            evict_leader_timeout: Duration::from_secs(180),
            advanced_statefulset: false,
            verify_higher_ordinals: false,
        }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Outcome of an admission check that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(String),
}

impl Verdict {
    pub fn denied(reason: impl std::fmt::Display) -> Self {
        Verdict::Denied(reason.to_string())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}
