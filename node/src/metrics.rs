//! # Prometheus Metrics
//!
//! Operational metrics for a serving node, scraped at `/metrics` on the
//! metrics port. Everything is registered in a dedicated
//! [`prometheus::Registry`] prefixed `linkchain_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Blocks appended through the API.
    pub blocks_appended_total: IntCounter,
    /// Appends rejected because another writer took the height first.
    pub append_conflicts_total: IntCounter,
    /// Validation requests served (single block or whole chain).
    pub validations_total: IntCounter,
    /// Failing heights reported by validation requests.
    pub invalid_blocks_detected_total: IntCounter,
    /// Height of the chain tip, or -1 for an empty chain.
    pub chain_height: IntGauge,
    /// Time spent in a single append, in seconds.
    pub append_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("linkchain".into()), None)
            .expect("failed to create prometheus registry");

        let blocks_appended_total =
            IntCounter::new("blocks_appended_total", "Total number of blocks appended")
                .expect("metric creation");
        registry
            .register(Box::new(blocks_appended_total.clone()))
            .expect("metric registration");

        let append_conflicts_total = IntCounter::new(
            "append_conflicts_total",
            "Appends rejected because the target height was already taken",
        )
        .expect("metric creation");
        registry
            .register(Box::new(append_conflicts_total.clone()))
            .expect("metric registration");

        let validations_total =
            IntCounter::new("validations_total", "Total number of validation requests")
                .expect("metric creation");
        registry
            .register(Box::new(validations_total.clone()))
            .expect("metric registration");

        let invalid_blocks_detected_total = IntCounter::new(
            "invalid_blocks_detected_total",
            "Total number of failing heights reported by validation",
        )
        .expect("metric creation");
        registry
            .register(Box::new(invalid_blocks_detected_total.clone()))
            .expect("metric registration");

        let chain_height = IntGauge::new("chain_height", "Height of the chain tip")
            .expect("metric creation");
        chain_height.set(-1);
        registry
            .register(Box::new(chain_height.clone()))
            .expect("metric registration");

        let append_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("append_latency_seconds", "Block append latency in seconds")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(append_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_appended_total,
            append_conflicts_total,
            validations_total,
            invalid_blocks_detected_total,
            chain_height,
            append_latency_seconds,
        }
    }

    /// Record the current tip height (`None` for an empty chain).
    pub fn set_height(&self, height: Option<u64>) {
        self.chain_height
            .set(height.map(|h| h as i64).unwrap_or(-1));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
