//! TiKV Safety Webhook
//!
//! Validating admission webhook guarding TiKV pod deletion and StatefulSet
//! partition changes for TiDB clusters.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tikv_safety_webhook::{
    AdmissionConfig, AdmissionGateway, AdmissionMetrics, Error, KubeObjectStore, PdClientFactory,
    PdConfig, Result, WebhookServer, WebhookServerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// TiKV Safety Webhook - admission checks for TiDB cluster storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Admission review bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    webhook_addr: String,

    /// Health and metrics bind address
    #[arg(long, env = "OPS_ADDR", default_value = "0.0.0.0:8081")]
    ops_addr: String,

    /// Seconds leader eviction may run before an upgrading pod is released
    #[arg(long, env = "EVICT_LEADER_TIMEOUT_SECS", default_value = "180")]
    evict_leader_timeout_secs: u64,

    /// Guard apps.pingcap.com StatefulSets instead of apps/v1
    #[arg(long, env = "ADVANCED_STATEFULSET")]
    advanced_statefulset: bool,

    /// Also require upgraded pods above the deleted ordinal to be healthy
    #[arg(long, env = "VERIFY_HIGHER_ORDINALS")]
    verify_higher_ordinals: bool,

    /// PD endpoint template; {cluster} and {namespace} are substituted
    #[arg(long, env = "PD_URL_TEMPLATE", default_value = "http://{cluster}-pd.{namespace}:2379")]
    pd_url_template: String,

    /// Timeout for each PD call in seconds
    #[arg(long, env = "PD_TIMEOUT_SECS", default_value = "5")]
    pd_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting TiKV Safety Webhook");
    info!("  Version: {}", tikv_safety_webhook::VERSION);
    info!("  Evict leader timeout: {}s", args.evict_leader_timeout_secs);
    info!("  Advanced StatefulSet: {}", args.advanced_statefulset);
    info!("  Verify higher ordinals: {}", args.verify_higher_ordinals);
    info!("  PD endpoint: {}", args.pd_url_template);

    let server_config = WebhookServerConfig {
        webhook_addr: parse_addr(&args.webhook_addr, "webhook")?,
        ops_addr: parse_addr(&args.ops_addr, "operations")?,
    };
    if args.pd_timeout_secs >= 10 {
        warn!(
            "PD timeout of {}s leaves no room inside the admission deadline",
            args.pd_timeout_secs
        );
    }

    let config = AdmissionConfig {
        evict_leader_timeout: Duration::from_secs(args.evict_leader_timeout_secs),
        advanced_statefulset: args.advanced_statefulset,
        verify_higher_ordinals: args.verify_higher_ordinals,
    };

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let objects = Arc::new(KubeObjectStore::new(client, config.advanced_statefulset));
    let placement = Arc::new(PdClientFactory::new(PdConfig {
        url_template: args.pd_url_template.clone(),
        timeout: Duration::from_secs(args.pd_timeout_secs),
    })?);
    let metrics = AdmissionMetrics::new()?;

    let gateway = AdmissionGateway::new(objects, placement, config, metrics);
    let server = Arc::new(WebhookServer::new(server_config, gateway));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;

    info!("Webhook shutdown complete");
    Ok(())
}

fn parse_addr(raw: &str, name: &str) -> Result<SocketAddr> {
    raw.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {:?}: {}", name, raw, e)))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
