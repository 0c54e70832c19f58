//! Deletion Decision Table
//!
//! Pure decision over everything known about a TiKV pod at admission time.
//! No I/O happens here: the engine gathers the facts, asks for a decision,
//! then carries out whatever side effect the decision names.

use super::eviction::eviction_ready;
use std::time::Duration;

/// Store state of the pod, reduced to what the decision needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreClass {
    /// The pod never registered a store, or the store is unknown
    NotFound,
    Tombstone,
    Offline,
    Down,
    Up,
}

impl std::fmt::Display for StoreClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreClass::NotFound => write!(f, "NotFound"),
            StoreClass::Tombstone => write!(f, "Tombstone"),
            StoreClass::Offline => write!(f, "Offline"),
            StoreClass::Down => write!(f, "Down"),
            StoreClass::Up => write!(f, "Up"),
        }
    }
}

/// Everything the decision table looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionFacts {
    pub store: StoreClass,
    /// Pod ordinal is below the StatefulSet's desired replica count
    pub ordinal_in_range: bool,
    /// Pod has not converged to the StatefulSet's update revision
    pub upgrading: bool,
    /// Age of the eviction-begin marker, `None` if the pod carries none
    pub eviction_age: Option<Duration>,
    /// Leaders the store still holds
    pub leader_count: u64,
}

impl DeletionFacts {
    /// The pod is an in-range Up store in the middle of a rolling upgrade,
    /// so the one-ordinal-at-a-time precondition must hold before deciding
    pub fn needs_upgrade_order_check(&self) -> bool {
        self.store == StoreClass::Up && self.ordinal_in_range && self.upgrading
    }
}

/// Why a deletion is refused for now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The store is being decommissioned by someone else
    StoreOffline,
    /// Store removal was requested; the pod goes once it is Tombstone
    AwaitingStoreRemoval,
    /// Leader eviction was just requested
    EvictionStarted,
    /// Leader eviction is running and neither drained nor timed out
    EvictionInProgress,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::StoreOffline => write!(f, "store is offline and being decommissioned"),
            DenyReason::AwaitingStoreRemoval => {
                write!(f, "store removal requested, waiting for decommission to finish")
            }
            DenyReason::EvictionStarted => write!(f, "leader eviction started"),
            DenyReason::EvictionInProgress => write!(f, "waiting for leader eviction to finish"),
        }
    }
}

/// Outcome of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Mark the pod's data claim for deferred deletion, then allow
    DeferClaimThenAllow,
    /// Ask the placement driver to remove the store, then deny
    RemoveStoreThenDeny,
    /// Begin leader eviction on the store, then deny
    BeginEvictionThenDeny,
    Deny(DenyReason),
}

impl Decision {
    /// Whether the pod may be deleted by this request
    pub fn allows(&self) -> bool {
        matches!(self, Decision::Allow | Decision::DeferClaimThenAllow)
    }
}

/// Decide whether a TiKV pod may be deleted
pub fn decide(facts: &DeletionFacts, evict_timeout: Duration) -> Decision {
    match facts.store {
        StoreClass::Tombstone | StoreClass::Down | StoreClass::NotFound => {
            if facts.ordinal_in_range {
                Decision::Allow
            } else {
                Decision::DeferClaimThenAllow
            }
        }
        StoreClass::Offline => Decision::Deny(DenyReason::StoreOffline),
        StoreClass::Up if !facts.ordinal_in_range => Decision::RemoveStoreThenDeny,
        StoreClass::Up if !facts.upgrading => Decision::Allow,
        StoreClass::Up => match facts.eviction_age {
            None => Decision::BeginEvictionThenDeny,
            Some(age) if eviction_ready(facts.leader_count, age, evict_timeout) => Decision::Allow,
            Some(_) => Decision::Deny(DenyReason::EvictionInProgress),
        },
    }
}
