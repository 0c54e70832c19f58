//! Webhook Server
//!
//! Serves admission reviews on one listener and health and metrics on a
//! second, so probes and scrapes never queue behind slow admission checks.

use super::gateway::AdmissionGateway;
use crate::error::{Error, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Server Configuration
// =============================================================================

/// Listen addresses for the webhook server
#[derive(Debug, Clone)]
pub struct WebhookServerConfig {
    /// Admission review endpoint
    pub webhook_addr: SocketAddr,
    /// Health and metrics endpoints
    pub ops_addr: SocketAddr,
}

impl Default for WebhookServerConfig {
    fn default() -> Self {
        Self {
            webhook_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            ops_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Router serving `POST /admit`
pub fn admission_router(gateway: AdmissionGateway) -> Router {
    Router::new()
        .route("/admit", post(admit))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Router serving `/healthz`, `/readyz` and `/metrics`
pub fn ops_router(gateway: AdmissionGateway) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(gateway)
}

async fn admit(
    State(gateway): State<AdmissionGateway>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(gateway.review(&request).await.into_review())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn metrics(State(gateway): State<AdmissionGateway>) -> Response {
    match gateway.metrics().render() {
        Ok((content_type, body)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// =============================================================================
// Webhook Server
// =============================================================================

/// Runs the admission and operations listeners until shutdown
pub struct WebhookServer {
    config: WebhookServerConfig,
    gateway: AdmissionGateway,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebhookServer {
    pub fn new(config: WebhookServerConfig, gateway: AdmissionGateway) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            gateway,
            shutdown_tx,
        }
    }

    /// Serve until shutdown is triggered or either listener fails
    pub async fn run(&self) -> Result<()> {
        info!("Starting webhook server");
        info!("  Admission: {}", self.config.webhook_addr);
        info!("  Operations: {}", self.config.ops_addr);

        let admission = tokio::spawn(serve(
            "admission",
            self.config.webhook_addr,
            admission_router(self.gateway.clone()),
            self.shutdown_tx.subscribe(),
        ));
        let ops = tokio::spawn(serve(
            "operations",
            self.config.ops_addr,
            ops_router(self.gateway.clone()),
            self.shutdown_tx.subscribe(),
        ));

        // Whichever listener stops first takes the other down with it
        let result = tokio::select! {
            r = admission => r,
            r = ops => r,
        };
        self.shutdown();

        match result {
            Ok(inner) => inner,
            Err(e) => Err(Error::Internal(format!("Server task failed: {}", e))),
        }
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn serve(
    name: &'static str,
    addr: SocketAddr,
    app: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", name, e)))?;

    info!("{} server listening on {}", name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("{} server shutting down", name);
        })
        .await
        .map_err(|e| Error::Internal(format!("{} server error: {}", name, e)))?;

    Ok(())
}
