//! Placement Driver Adapter
//!
//! Talks to the PD HTTP API of a TiDB cluster. One `reqwest::Client` is built
//! at startup and shared by every per-cluster handle the factory hands out.

use crate::domain::ports::{
    PlacementClient, PlacementClientFactory, PlacementClientRef, StoreInfo, StoreState,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const STORES_PREFIX: &str = "pd/api/v1/stores";
const STORE_PREFIX: &str = "pd/api/v1/store";
const SCHEDULERS_PREFIX: &str = "pd/api/v1/schedulers";
const EVICT_LEADER_SCHEDULER: &str = "evict-leader-scheduler";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the PD adapter
#[derive(Debug, Clone)]
pub struct PdConfig {
    /// Endpoint template; `{cluster}` and `{namespace}` are substituted
    pub url_template: String,
    /// Timeout for each PD call
    pub timeout: Duration,
}

impl Default for PdConfig {
    fn default() -> Self {
        Self {
            url_template: "http://{cluster}-pd.{namespace}:2379".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl PdConfig {
    /// Resolve the PD endpoint of a cluster
    pub fn url_for(&self, namespace: &str, cluster: &str) -> String {
        self.url_template
            .replace("{cluster}", cluster)
            .replace("{namespace}", namespace)
            .trim_end_matches('/')
            .to_string()
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StoresResponse {
    #[serde(default)]
    stores: Vec<StoreEntry>,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    store: StoreMeta,
    #[serde(default)]
    status: StoreStatus,
}

#[derive(Debug, Deserialize)]
struct StoreMeta {
    id: u64,
    #[serde(default)]
    address: String,
    #[serde(default)]
    state_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct StoreStatus {
    #[serde(default)]
    leader_count: u64,
}

impl From<StoreEntry> for StoreInfo {
    fn from(entry: StoreEntry) -> Self {
        StoreInfo {
            id: entry.store.id,
            address: entry.store.address,
            state: StoreState::from_state_name(&entry.store.state_name),
            leader_count: entry.status.leader_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct EvictLeaderRequest<'a> {
    name: &'a str,
    store_id: u64,
}

/// PD reports an unknown store with this text, whatever the status code
fn is_store_not_found(body: &str, store_id: u64) -> bool {
    body.contains(&format!("invalid store ID {}, not found", store_id))
}

// =============================================================================
// PD Client
// =============================================================================

/// Client for one cluster's PD
#[derive(Clone)]
pub struct PdClient {
    http: reqwest::Client,
    base_url: String,
}

impl PdClient {
    /// Create a client for the PD at `base_url`
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn a non-success response into an error carrying its body
    async fn api_error(operation: &str, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Error::PlacementApi {
            operation: operation.to_string(),
            status,
            message: message.trim().to_string(),
        }
    }
}

#[async_trait]
impl PlacementClient for PdClient {
    async fn get_stores(&self) -> Result<Vec<StoreInfo>> {
        let response = self.http.get(self.url(STORES_PREFIX)).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error("get_stores", response).await);
        }

        let stores: StoresResponse = response.json().await?;
        debug!(pd = %self.base_url, count = stores.stores.len(), "Fetched stores");
        Ok(stores.stores.into_iter().map(StoreInfo::from).collect())
    }

    async fn get_store(&self, store_id: u64) -> Result<StoreInfo> {
        let url = self.url(&format!("{}/{}", STORE_PREFIX, store_id));
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if status.is_success() {
            let entry: StoreEntry = response.json().await?;
            return Ok(entry.into());
        }

        // Only PD's own wording counts; a bare 404 may come from a proxy or a
        // mistyped endpoint and says nothing about the store
        let body = response.text().await.unwrap_or_default();
        if is_store_not_found(&body, store_id) {
            return Err(Error::StoreNotFound { store_id });
        }
        Err(Error::PlacementApi {
            operation: "get_store".to_string(),
            status: status.as_u16(),
            message: body.trim().to_string(),
        })
    }

    async fn delete_store(&self, store_id: u64) -> Result<()> {
        let url = self.url(&format!("{}/{}", STORE_PREFIX, store_id));
        let response = self.http.delete(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error("delete_store", response).await);
        }

        info!(pd = %self.base_url, store_id, "Requested store deletion");
        Ok(())
    }

    async fn begin_evict_leader(&self, store_id: u64) -> Result<()> {
        let request = EvictLeaderRequest {
            name: EVICT_LEADER_SCHEDULER,
            store_id,
        };
        let response = self
            .http
            .post(self.url(SCHEDULERS_PREFIX))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A scheduler left over from an earlier attempt already does the job
            if body.contains("scheduler existed") {
                debug!(pd = %self.base_url, store_id, "Evict leader scheduler already exists");
                return Ok(());
            }
            return Err(Error::PlacementApi {
                operation: "begin_evict_leader".to_string(),
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        info!(pd = %self.base_url, store_id, "Added evict leader scheduler");
        Ok(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Hands out PD clients per cluster, sharing one connection pool
pub struct PdClientFactory {
    config: PdConfig,
    http: reqwest::Client,
}

impl PdClientFactory {
    /// Build the factory and its HTTP client
    pub fn new(config: PdConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }
}

impl PlacementClientFactory for PdClientFactory {
    fn client_for(&self, namespace: &str, name: &str) -> Result<PlacementClientRef> {
        Ok(Arc::new(PdClient::new(
            self.http.clone(),
            self.config.url_for(namespace, name),
        )))
    }
}
