//! Error types for the TiKV safety webhook
//!
//! Every failure in the admission path renders to a denied admission
//! response. The variants here keep the causes apart so logs and metrics
//! can tell an unreachable placement driver from a malformed annotation.

use thiserror::Error;

/// Unified error type for the webhook
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Placement Driver Errors
    // =========================================================================
    #[error("Placement driver connection error: {0}")]
    PlacementConnection(#[from] reqwest::Error),

    #[error("Placement driver returned {status} for {operation}: {message}")]
    PlacementApi {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("invalid store ID {store_id}, not found")]
    StoreNotFound { store_id: u64 },

    #[error("Unknown state {state:?} reported for store {store_id}")]
    UnknownStoreState { store_id: u64, state: String },

    // =========================================================================
    // Malformed Input
    // =========================================================================
    #[error("Invalid pod ordinal in name {name}")]
    InvalidOrdinal { name: String },

    #[error("Invalid store id label {value:?} on pod {pod}")]
    InvalidStoreId { pod: String, value: String },

    #[error("Invalid annotation {key}={value:?} on {object}: {reason}")]
    InvalidAnnotation {
        object: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    // =========================================================================
    // Safety Preconditions
    // =========================================================================
    #[error("upgrade order violated: {0}")]
    UpgradeOrderViolated(String),
}

impl Error {
    /// Check if this error came from an upstream system that may recover
    /// on its own by the time the request is re-issued
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::PlacementConnection(_) | Error::PlacementApi { .. }
        )
    }

    /// Check if this error is an optimistic concurrency conflict on update
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }
}

/// Result type alias for the webhook
pub type Result<T> = std::result::Result<T, Error>;
