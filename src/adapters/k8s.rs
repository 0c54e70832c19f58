//! Kubernetes Object Store Adapter
//!
//! Implements the object-store port on top of `kube::Client`. Writes use
//! `replace`, which carries the object's resourceVersion, so a concurrent
//! writer surfaces as a 409 instead of being silently overwritten.

use crate::crd::TidbCluster;
use crate::domain::ports::{ObjectStore, StatefulSetInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, ApiResource, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::Client;
use serde::Deserialize;
use tracing::debug;

/// API group of the advanced StatefulSet
pub const ADVANCED_STATEFULSET_GROUP: &str = "apps.pingcap.com";

/// API group of the built-in StatefulSet
pub const STATEFULSET_GROUP: &str = "apps";

/// Map a 404 to `ResourceNotFound`, pass everything else through
fn map_get_error(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(ref e) if e.code == 404 => Error::ResourceNotFound {
            kind: kind.to_string(),
            name: format!("{}/{}", namespace, name),
        },
        other => Error::Kube(other),
    }
}

fn object_name(name: &Option<String>, kind: &str) -> Result<String> {
    name.clone()
        .ok_or_else(|| Error::Internal(format!("{} without a name cannot be replaced", kind)))
}

fn object_namespace(namespace: &Option<String>, kind: &str) -> Result<String> {
    namespace
        .clone()
        .ok_or_else(|| Error::Internal(format!("{} without a namespace cannot be replaced", kind)))
}

/// Extract the fields the deletion engine needs from a dynamic StatefulSet
pub fn statefulset_info(obj: &DynamicObject) -> Result<StatefulSetInfo> {
    let controller = obj
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
        .cloned();

    // The API server defaults an omitted replica count to 1
    let replicas = Option::<i32>::deserialize(&obj.data["spec"]["replicas"])?.unwrap_or(1);

    Ok(StatefulSetInfo {
        name: obj.metadata.name.clone().unwrap_or_default(),
        namespace: obj.metadata.namespace.clone().unwrap_or_default(),
        replicas,
        update_revision: obj.data["status"]["updateRevision"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        controller,
    })
}

// =============================================================================
// Kube Object Store
// =============================================================================

/// Object store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    statefulsets: ApiResource,
}

impl KubeObjectStore {
    /// Create an object store; `advanced_statefulset` selects the
    /// `apps.pingcap.com` StatefulSet instead of `apps/v1`
    pub fn new(client: Client, advanced_statefulset: bool) -> Self {
        let group = if advanced_statefulset {
            ADVANCED_STATEFULSET_GROUP
        } else {
            STATEFULSET_GROUP
        };
        let gvk = GroupVersionKind::gvk(group, "v1", "StatefulSet");

        Self {
            client,
            statefulsets: ApiResource::from_gvk_with_plural(&gvk, "statefulsets"),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_get_error(e, "Pod", namespace, name))
    }

    async fn replace_pod(&self, pod: &Pod) -> Result<Pod> {
        let name = object_name(&pod.metadata.name, "Pod")?;
        let namespace = object_namespace(&pod.metadata.namespace, "Pod")?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        debug!(namespace = %namespace, pod = %name, "Replacing pod");
        Ok(api.replace(&name, &PostParams::default(), pod).await?)
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_get_error(e, "PersistentVolumeClaim", namespace, name))
    }

    async fn replace_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim> {
        let name = object_name(&pvc.metadata.name, "PersistentVolumeClaim")?;
        let namespace = object_namespace(&pvc.metadata.namespace, "PersistentVolumeClaim")?;
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);

        debug!(namespace = %namespace, pvc = %name, "Replacing claim");
        Ok(api.replace(&name, &PostParams::default(), pvc).await?)
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<StatefulSetInfo> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.statefulsets);
        let obj = api
            .get(name)
            .await
            .map_err(|e| map_get_error(e, "StatefulSet", namespace, name))?;
        statefulset_info(&obj)
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<TidbCluster> {
        let api: Api<TidbCluster> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_get_error(e, "TidbCluster", namespace, name))
    }
}
