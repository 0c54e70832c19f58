//! Admission Gateway
//!
//! Routes admission requests to the check that guards their resource and
//! turns the result into an admission response. Any error from a check is
//! rendered as a denial carrying the error text.

use super::pod::PodDeletionGuard;
use super::statefulset::PartitionGuard;
use super::{AdmissionConfig, Verdict};
use crate::domain::ports::{ObjectStoreRef, PlacementClientFactoryRef};
use crate::error::{Error, Result};
use crate::metrics::{AdmissionMetrics, AdmissionOutcome};
use chrono::Utc;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which check an admission request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PodDelete,
    StatefulSetUpdate,
    Passthrough,
}

impl Route {
    /// Route a request by resource, sub-resource and operation
    pub fn of(request: &AdmissionRequest<DynamicObject>) -> Self {
        if request.sub_resource.is_some() {
            return Route::Passthrough;
        }
        let resource = &request.resource;
        match (resource.group.as_str(), resource.resource.as_str(), &request.operation) {
            ("", "pods", Operation::Delete) => Route::PodDelete,
            (_, "statefulsets", Operation::Update) => Route::StatefulSetUpdate,
            _ => Route::Passthrough,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            Route::PodDelete => "pods",
            Route::StatefulSetUpdate => "statefulsets",
            Route::Passthrough => "other",
        }
    }
}

/// Entry point for every admission request the webhook receives
#[derive(Clone)]
pub struct AdmissionGateway {
    pods: PodDeletionGuard,
    statefulsets: PartitionGuard,
    metrics: AdmissionMetrics,
}

impl AdmissionGateway {
    pub fn new(
        objects: ObjectStoreRef,
        placement: PlacementClientFactoryRef,
        config: AdmissionConfig,
        metrics: AdmissionMetrics,
    ) -> Self {
        Self {
            statefulsets: PartitionGuard::new(objects.clone(), config.advanced_statefulset),
            pods: PodDeletionGuard::new(objects, placement, config),
            metrics,
        }
    }

    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }

    /// Decide an admission request
    pub async fn review(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let started = Instant::now();
        let route = Route::of(request);
        let uid = request.uid.as_str();

        let result = match route {
            Route::PodDelete => self.admit_pod_delete(request).await,
            Route::StatefulSetUpdate => self.admit_statefulset_update(request).await,
            Route::Passthrough => Ok(Verdict::Allowed),
        };

        let response = AdmissionResponse::from(request);
        let (response, outcome) = match result {
            Ok(Verdict::Allowed) => {
                debug!(uid, name = %request.name, route = ?route, "Admission allowed");
                (response, AdmissionOutcome::Allowed)
            }
            Ok(Verdict::Denied(reason)) => {
                info!(uid, name = %request.name, route = ?route, %reason, "Admission denied");
                (response.deny(reason), AdmissionOutcome::Denied)
            }
            Err(e) => {
                warn!(
                    uid,
                    name = %request.name,
                    route = ?route,
                    transient = e.is_transient(),
                    error = %e,
                    "Admission check failed, denying"
                );
                (response.deny(e.to_string()), AdmissionOutcome::Error)
            }
        };

        self.metrics
            .observe(route.metric_label(), outcome, started.elapsed());
        response
    }

    async fn admit_pod_delete(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Verdict> {
        let namespace = request.namespace.as_deref().unwrap_or_default();
        self.pods
            .admit_delete(namespace, &request.name, Utc::now())
            .await
    }

    async fn admit_statefulset_update(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<Verdict> {
        let old = request.old_object.as_ref().ok_or_else(|| {
            Error::Internal(format!(
                "update of StatefulSet {} carries no old object",
                request.name
            ))
        })?;
        self.statefulsets
            .admit_update(&request.resource.group, old, request.object.as_ref())
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::fake::{
        cluster, statefulset, store, tikv_pod, FakeObjectStore, FakePlacement,
        FakePlacementFactory, PlacementCommand,
    };
    use crate::domain::labels::TIKV_PARTITION_ANNOTATION;
    use crate::domain::ports::StoreState;
    use kube::core::admission::AdmissionReview;
    use std::sync::Arc;

    /// Build an admission request the way the API server sends it
    pub(crate) fn request(
        group: &str,
        resource: &str,
        operation: &str,
        name: &str,
        object: Option<serde_json::Value>,
        old_object: Option<serde_json::Value>,
    ) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": group, "version": "v1", "kind": "Object" },
                "resource": { "group": group, "version": "v1", "resource": resource },
                "name": name,
                "namespace": "default",
                "operation": operation,
                "userInfo": { "username": "system:serviceaccount:kube-system:statefulset-controller" },
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    pub(crate) fn setup() -> (Arc<FakeObjectStore>, Arc<FakePlacement>, AdmissionGateway) {
        let objects = Arc::new(FakeObjectStore::default());
        objects.insert_statefulset(statefulset("default", "basic-tikv", "basic", 5, Some("rev-2")));
        objects.insert_cluster(cluster("default", "basic", &[(TIKV_PARTITION_ANNOTATION, "3")]));
        objects.insert_pod(tikv_pod("default", "basic-tikv", 2, Some(3), Some("rev-2")));
        objects.insert_pod(tikv_pod("default", "basic-tikv", 6, Some(7), Some("rev-2")));

        let placement = FakePlacement::with_stores(vec![
            store(3, StoreState::Up, 10),
            store(7, StoreState::Up, 4),
        ]);
        let gateway = AdmissionGateway::new(
            objects.clone(),
            Arc::new(FakePlacementFactory(placement.clone())),
            AdmissionConfig::default(),
            AdmissionMetrics::new().unwrap(),
        );
        (objects, placement, gateway)
    }

    fn tikv_statefulset(partition: i32) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {
                "name": "basic-tikv",
                "namespace": "default",
                "labels": { "app.kubernetes.io/component": "tikv" },
                "ownerReferences": [{
                    "apiVersion": "pingcap.com/v1alpha1",
                    "kind": "TidbCluster",
                    "name": "basic",
                    "uid": "uid-basic",
                    "controller": true
                }]
            },
            "spec": {
                "replicas": 5,
                "updateStrategy": { "type": "RollingUpdate", "rollingUpdate": { "partition": partition } }
            }
        })
    }

    #[test]
    fn test_routing() {
        let r = request("", "pods", "DELETE", "basic-tikv-0", None, None);
        assert_eq!(Route::of(&r), Route::PodDelete);

        let r = request("", "pods", "CREATE", "basic-tikv-0", None, None);
        assert_eq!(Route::of(&r), Route::Passthrough);

        let r = request("apps", "statefulsets", "UPDATE", "basic-tikv", None, None);
        assert_eq!(Route::of(&r), Route::StatefulSetUpdate);

        let r = request("apps.pingcap.com", "statefulsets", "UPDATE", "basic-tikv", None, None);
        assert_eq!(Route::of(&r), Route::StatefulSetUpdate);

        let r = request("apps", "statefulsets", "DELETE", "basic-tikv", None, None);
        assert_eq!(Route::of(&r), Route::Passthrough);

        let r = request("apps", "deployments", "UPDATE", "web", None, None);
        assert_eq!(Route::of(&r), Route::Passthrough);

        let mut r = request("", "pods", "DELETE", "basic-tikv-0", None, None);
        r.sub_resource = Some("eviction".to_string());
        assert_eq!(Route::of(&r), Route::Passthrough);
    }

    #[tokio::test]
    async fn test_pod_delete_allowed() {
        let (_, _, gateway) = setup();
        let r = request("", "pods", "DELETE", "basic-tikv-2", None, None);

        let response = gateway.review(&r).await;
        assert!(response.allowed);
        assert_eq!(response.uid, r.uid);
        assert_eq!(
            gateway.metrics().request_count("pods", AdmissionOutcome::Allowed),
            1
        );
    }

    #[tokio::test]
    async fn test_pod_delete_denied_with_reason() {
        let (_, placement, gateway) = setup();
        let r = request("", "pods", "DELETE", "basic-tikv-6", None, None);

        let response = gateway.review(&r).await;
        assert!(!response.allowed);
        assert!(response.result.message.contains("store 7"));
        assert_eq!(placement.commands(), vec![PlacementCommand::DeleteStore(7)]);
        assert_eq!(
            gateway.metrics().request_count("pods", AdmissionOutcome::Denied),
            1
        );
    }

    #[tokio::test]
    async fn test_check_failure_denies() {
        let (_, placement, gateway) = setup();
        placement.set_unavailable();
        let r = request("", "pods", "DELETE", "basic-tikv-2", None, None);

        let response = gateway.review(&r).await;
        assert!(!response.allowed);
        assert!(response.result.message.contains("503"));
        assert_eq!(
            gateway.metrics().request_count("pods", AdmissionOutcome::Error),
            1
        );
    }

    #[tokio::test]
    async fn test_statefulset_partition_guarded() {
        let (_, _, gateway) = setup();

        let r = request(
            "apps",
            "statefulsets",
            "UPDATE",
            "basic-tikv",
            Some(tikv_statefulset(2)),
            Some(tikv_statefulset(5)),
        );
        assert!(!gateway.review(&r).await.allowed);

        let r = request(
            "apps",
            "statefulsets",
            "UPDATE",
            "basic-tikv",
            Some(tikv_statefulset(4)),
            Some(tikv_statefulset(5)),
        );
        assert!(gateway.review(&r).await.allowed);
    }

    #[tokio::test]
    async fn test_statefulset_other_group_passes() {
        let (_, _, gateway) = setup();

        // Same update is refused under apps, but this deployment guards apps/v1 only
        let r = request(
            "apps.pingcap.com",
            "statefulsets",
            "UPDATE",
            "basic-tikv",
            Some(tikv_statefulset(2)),
            Some(tikv_statefulset(5)),
        );
        assert!(gateway.review(&r).await.allowed);
    }

    #[tokio::test]
    async fn test_statefulset_update_without_old_object_denied() {
        let (_, _, gateway) = setup();
        let r = request(
            "apps",
            "statefulsets",
            "UPDATE",
            "basic-tikv",
            Some(tikv_statefulset(4)),
            None,
        );
        assert!(!gateway.review(&r).await.allowed);
    }

    #[tokio::test]
    async fn test_other_resources_pass() {
        let (_, placement, gateway) = setup();
        let r = request("", "pods", "CREATE", "basic-tikv-9", None, None);
        assert!(gateway.review(&r).await.allowed);

        let r = request("", "configmaps", "DELETE", "basic-config", None, None);
        assert!(gateway.review(&r).await.allowed);
        assert!(placement.commands().is_empty());
        assert_eq!(
            gateway.metrics().request_count("other", AdmissionOutcome::Allowed),
            2
        );
    }
}
