//! Port Adapters
//!
//! Concrete implementations of the domain ports:
//! - PD: placement driver HTTP API
//! - K8s: Kubernetes API server

pub mod k8s;
pub mod pd;

pub use k8s::*;
pub use pd::*;
