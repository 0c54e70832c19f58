//! Domain layer - Port definitions, markers and naming rules
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod labels;
pub mod markers;
pub mod ports;

#[cfg(test)]
pub(crate) mod fake;

pub use labels::MemberRole;
pub use markers::{DeferredDeletion, EvictionState, MarkerStore};
pub use ports::*;
