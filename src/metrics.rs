//! Admission Metrics
//!
//! Counters and latency histograms for admission decisions, kept in a
//! registry owned by the server rather than the process-global default.

use crate::error::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Final outcome of one admission request, as recorded in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Allowed,
    Denied,
    /// The check failed and the request was refused
    Error,
}

impl AdmissionOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmissionOutcome::Allowed => "allowed",
            AdmissionOutcome::Denied => "denied",
            AdmissionOutcome::Error => "error",
        }
    }
}

/// Admission request metrics
#[derive(Clone)]
pub struct AdmissionMetrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl AdmissionMetrics {
    /// Create the metrics and register them in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "admission_requests_total",
                "Admission requests handled, by resource and verdict",
            ),
            &["resource", "verdict"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "admission_duration_seconds",
                "Time spent deciding an admission request",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["resource"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
        })
    }

    /// Record one handled request
    pub fn observe(&self, resource: &str, outcome: AdmissionOutcome, elapsed: Duration) {
        self.requests
            .with_label_values(&[resource, outcome.as_label()])
            .inc();
        self.duration
            .with_label_values(&[resource])
            .observe(elapsed.as_secs_f64());
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self, resource: &str, outcome: AdmissionOutcome) -> u64 {
        self.requests
            .with_label_values(&[resource, outcome.as_label()])
            .get()
    }
}
