//! Custom Resource Definitions read by the webhook
//!
//! - TidbCluster: parent resource owning the guarded StatefulSets

pub mod tidb_cluster;

pub use tidb_cluster::*;
