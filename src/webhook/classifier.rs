//! Store State Classifier
//!
//! Maps a TiKV pod to the state of the store backing it. A pod that never
//! registered a store, or whose store the placement driver has forgotten,
//! classifies as `NotFound`. Every other failure is returned to the caller:
//! the classifier never guesses.

use super::decision::StoreClass;
use crate::domain::labels::STORE_ID_LABEL_KEY;
use crate::domain::ports::{PlacementClient, StoreInfo, StoreState};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

/// Classified store, carrying the placement driver's view when there is one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedStore {
    NotFound,
    Tombstone(StoreInfo),
    Offline(StoreInfo),
    Down(StoreInfo),
    Up(StoreInfo),
}

impl ClassifiedStore {
    /// The state class used by the decision table
    pub fn class(&self) -> StoreClass {
        match self {
            ClassifiedStore::NotFound => StoreClass::NotFound,
            ClassifiedStore::Tombstone(_) => StoreClass::Tombstone,
            ClassifiedStore::Offline(_) => StoreClass::Offline,
            ClassifiedStore::Down(_) => StoreClass::Down,
            ClassifiedStore::Up(_) => StoreClass::Up,
        }
    }

    /// The store, unless it was not found
    pub fn store(&self) -> Option<&StoreInfo> {
        match self {
            ClassifiedStore::NotFound => None,
            ClassifiedStore::Tombstone(s)
            | ClassifiedStore::Offline(s)
            | ClassifiedStore::Down(s)
            | ClassifiedStore::Up(s) => Some(s),
        }
    }
}

/// Read the store ID label of a pod, `None` if the pod carries none
pub fn store_id_of(pod: &Pod) -> Result<Option<u64>> {
    let Some(raw) = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(STORE_ID_LABEL_KEY))
    else {
        return Ok(None);
    };

    raw.parse::<u64>().map(Some).map_err(|_| Error::InvalidStoreId {
        pod: pod.metadata.name.clone().unwrap_or_default(),
        value: raw.clone(),
    })
}

/// Classify the store backing `pod`
pub async fn classify(pod: &Pod, placement: &dyn PlacementClient) -> Result<ClassifiedStore> {
    let Some(store_id) = store_id_of(pod)? else {
        debug!(pod = ?pod.metadata.name, "Pod has no store ID, it never joined the cluster");
        return Ok(ClassifiedStore::NotFound);
    };

    let store = match placement.get_store(store_id).await {
        Ok(store) => store,
        Err(Error::StoreNotFound { .. }) => {
            debug!(pod = ?pod.metadata.name, store_id, "Store not known to placement driver");
            return Ok(ClassifiedStore::NotFound);
        }
        Err(e) => return Err(e),
    };

    match &store.state {
        StoreState::Up => Ok(ClassifiedStore::Up(store)),
        StoreState::Offline => Ok(ClassifiedStore::Offline(store)),
        StoreState::Down => Ok(ClassifiedStore::Down(store)),
        StoreState::Tombstone => Ok(ClassifiedStore::Tombstone(store)),
        StoreState::Unknown(name) => Err(Error::UnknownStoreState {
            store_id,
            state: name.clone(),
        }),
    }
}
