//! In-memory fakes of the domain ports for tests

use crate::crd::{TidbCluster, TidbClusterSpec};
use crate::domain::labels::{
    COMPONENT_LABEL_KEY, REVISION_LABEL_KEY, STORE_ID_LABEL_KEY,
};
use crate::domain::ports::{
    ObjectStore, PlacementClient, PlacementClientFactory, PlacementClientRef, StatefulSetInfo,
    StoreInfo, StoreState,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn meta_key(meta: &ObjectMeta) -> Key {
    key(
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

fn not_found(kind: &str, namespace: &str, name: &str) -> Error {
    Error::ResourceNotFound {
        kind: kind.to_string(),
        name: format!("{}/{}", namespace, name),
    }
}

// =============================================================================
// Object builders
// =============================================================================

/// A bare pod
pub fn pod(namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A TiKV pod owned by StatefulSet `set`, optionally backed by a store
/// and stamped with a revision
pub fn tikv_pod(
    namespace: &str,
    set: &str,
    ordinal: i32,
    store_id: Option<u64>,
    revision: Option<&str>,
) -> Pod {
    let mut p = pod(namespace, &format!("{}-{}", set, ordinal));
    let mut labels = BTreeMap::new();
    labels.insert(COMPONENT_LABEL_KEY.to_string(), "tikv".to_string());
    if let Some(id) = store_id {
        labels.insert(STORE_ID_LABEL_KEY.to_string(), id.to_string());
    }
    if let Some(rev) = revision {
        labels.insert(REVISION_LABEL_KEY.to_string(), rev.to_string());
    }
    p.metadata.labels = Some(labels);
    p.metadata.owner_references = Some(vec![controller_ref("apps/v1", "StatefulSet", set)]);
    p
}

/// A controlling owner reference
pub fn controller_ref(api_version: &str, kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// A StatefulSet owned by cluster `cluster`
pub fn statefulset(
    namespace: &str,
    name: &str,
    cluster: &str,
    replicas: i32,
    update_revision: Option<&str>,
) -> StatefulSetInfo {
    StatefulSetInfo {
        name: name.to_string(),
        namespace: namespace.to_string(),
        replicas,
        update_revision: update_revision.map(str::to_string),
        controller: Some(controller_ref("pingcap.com/v1alpha1", "TidbCluster", cluster)),
    }
}

/// A cluster carrying the given annotations
pub fn cluster(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> TidbCluster {
    let mut tc = TidbCluster::new(name, TidbClusterSpec::default());
    tc.metadata.namespace = Some(namespace.to_string());
    if !annotations.is_empty() {
        tc.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    tc
}

/// A store in the given state
pub fn store(id: u64, state: StoreState, leader_count: u64) -> StoreInfo {
    StoreInfo {
        id,
        address: format!("basic-tikv-{}.basic-tikv-peer:20160", id),
        state,
        leader_count,
    }
}

// =============================================================================
// Fake Object Store
// =============================================================================

/// Object store backed by in-memory maps, counting writes
#[derive(Default)]
pub struct FakeObjectStore {
    pods: Mutex<BTreeMap<Key, Pod>>,
    pvcs: Mutex<BTreeMap<Key, PersistentVolumeClaim>>,
    sets: Mutex<BTreeMap<Key, StatefulSetInfo>>,
    clusters: Mutex<BTreeMap<Key, TidbCluster>>,
    pod_writes: Mutex<usize>,
    pvc_writes: Mutex<usize>,
    fail_pod_writes: Mutex<bool>,
}

impl FakeObjectStore {
    pub fn insert_pod(&self, pod: Pod) {
        self.pods.lock().insert(meta_key(&pod.metadata), pod);
    }

    pub fn insert_pvc(&self, namespace: &str, name: &str) {
        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.pvcs.lock().insert(key(namespace, name), pvc);
    }

    pub fn insert_statefulset(&self, set: StatefulSetInfo) {
        self.sets
            .lock()
            .insert(key(&set.namespace, &set.name), set);
    }

    pub fn insert_cluster(&self, tc: TidbCluster) {
        self.clusters.lock().insert(meta_key(&tc.metadata), tc);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.lock().get(&key(namespace, name)).cloned()
    }

    pub fn pvc(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.pvcs.lock().get(&key(namespace, name)).cloned()
    }

    pub fn pod_writes(&self) -> usize {
        *self.pod_writes.lock()
    }

    pub fn pvc_writes(&self) -> usize {
        *self.pvc_writes.lock()
    }

    /// Make every pod replace fail as if another writer got there first
    pub fn fail_pod_writes(&self) {
        *self.fail_pod_writes.lock() = true;
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pod(namespace, name)
            .ok_or_else(|| not_found("Pod", namespace, name))
    }

    async fn replace_pod(&self, pod: &Pod) -> Result<Pod> {
        if *self.fail_pod_writes.lock() {
            return Err(Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".into(),
                message: "the object has been modified".into(),
                reason: "Conflict".into(),
                code: 409,
            })));
        }
        *self.pod_writes.lock() += 1;
        self.insert_pod(pod.clone());
        Ok(pod.clone())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        self.pvc(namespace, name)
            .ok_or_else(|| not_found("PersistentVolumeClaim", namespace, name))
    }

    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim> {
        *self.pvc_writes.lock() += 1;
        self.pvcs.lock().insert(meta_key(&pvc.metadata), pvc.clone());
        Ok(pvc.clone())
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSetInfo> {
        self.sets
            .lock()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("StatefulSet", namespace, name))
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TidbCluster> {
        self.clusters
            .lock()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("TidbCluster", namespace, name))
    }
}

// =============================================================================
// Fake Placement Driver
// =============================================================================

/// Commands issued against the fake placement driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementCommand {
    DeleteStore(u64),
    EvictLeader(u64),
}

/// Placement driver backed by an in-memory store table
#[derive(Default)]
pub struct FakePlacement {
    stores: Mutex<BTreeMap<u64, StoreInfo>>,
    commands: Mutex<Vec<PlacementCommand>>,
    unavailable: Mutex<bool>,
}

impl FakePlacement {
    pub fn with_stores(stores: Vec<StoreInfo>) -> Arc<Self> {
        let fake = Self::default();
        for s in stores {
            fake.stores.lock().insert(s.id, s);
        }
        Arc::new(fake)
    }

    pub fn set_leader_count(&self, store_id: u64, leader_count: u64) {
        if let Some(s) = self.stores.lock().get_mut(&store_id) {
            s.leader_count = leader_count;
        }
    }

    pub fn set_unavailable(&self) {
        *self.unavailable.lock() = true;
    }

    pub fn commands(&self) -> Vec<PlacementCommand> {
        self.commands.lock().clone()
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if *self.unavailable.lock() {
            return Err(Error::PlacementApi {
                operation: operation.to_string(),
                status: 503,
                message: "no leader".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlacementClient for FakePlacement {
    async fn get_stores(&self) -> Result<Vec<StoreInfo>> {
        self.check_available("get_stores")?;
        Ok(self.stores.lock().values().cloned().collect())
    }

    async fn get_store(&self, store_id: u64) -> Result<StoreInfo> {
        self.check_available("get_store")?;
        self.stores
            .lock()
            .get(&store_id)
            .cloned()
            .ok_or(Error::StoreNotFound { store_id })
    }

    async fn delete_store(&self, store_id: u64) -> Result<()> {
        self.check_available("delete_store")?;
        self.commands.lock().push(PlacementCommand::DeleteStore(store_id));
        Ok(())
    }

    async fn begin_evict_leader(&self, store_id: u64) -> Result<()> {
        self.check_available("begin_evict_leader")?;
        self.commands.lock().push(PlacementCommand::EvictLeader(store_id));
        Ok(())
    }
}

/// Factory returning the same fake for every cluster
pub struct FakePlacementFactory(pub Arc<FakePlacement>);

impl PlacementClientFactory for FakePlacementFactory {
    fn client_for(&self, _namespace: &str, _name: &str) -> Result<PlacementClientRef> {
        Ok(self.0.clone())
    }
}
