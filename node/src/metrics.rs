//! # Prometheus Metrics
//!
//! Operational metrics for the voting node, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! under the `quadvote` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use quadvote_protocol::{CommitPipeline, CommitReport};

/// Metric handles for the node. Cloning shares the underlying metrics.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful sign-ups.
    pub signups_total: IntCounter,
    /// Intents the protocol accepted.
    pub intents_published_total: IntCounter,
    /// Intents that failed or timed out.
    pub publish_failures_total: IntCounter,
    /// Commit rounds that ran to completion, empty ones included.
    pub commit_rounds_total: IntCounter,
    pub voice_credit_balance: IntGauge,
    pub cart_size: IntGauge,
    /// Wall time of a commit round.
    pub commit_round_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("quadvote".into()), None)?;

        let signups_total = IntCounter::new("signups_total", "Successful voter sign-ups")?;
        registry.register(Box::new(signups_total.clone()))?;

        let intents_published_total = IntCounter::new(
            "intents_published_total",
            "Cart intents accepted by the voting protocol",
        )?;
        registry.register(Box::new(intents_published_total.clone()))?;

        let publish_failures_total = IntCounter::new(
            "publish_failures_total",
            "Cart intents that failed to publish or timed out",
        )?;
        registry.register(Box::new(publish_failures_total.clone()))?;

        let commit_rounds_total =
            IntCounter::new("commit_rounds_total", "Completed commit rounds")?;
        registry.register(Box::new(commit_rounds_total.clone()))?;

        let voice_credit_balance = IntGauge::new(
            "voice_credit_balance",
            "Spendable voice credits after reservations",
        )?;
        registry.register(Box::new(voice_credit_balance.clone()))?;

        let cart_size = IntGauge::new("cart_size", "Intents waiting in the vote cart")?;
        registry.register(Box::new(cart_size.clone()))?;

        let commit_round_seconds = Histogram::with_opts(
            HistogramOpts::new("commit_round_seconds", "Commit round duration in seconds")
                .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(commit_round_seconds.clone()))?;

        Ok(Self {
            registry,
            signups_total,
            intents_published_total,
            publish_failures_total,
            commit_rounds_total,
            voice_credit_balance,
            cart_size,
            commit_round_seconds,
        })
    }

    /// Counts one finished commit round.
    pub fn record_commit(&self, report: &CommitReport) {
        self.commit_rounds_total.inc();
        self.intents_published_total
            .inc_by(report.committed.len() as u64);
        self.publish_failures_total.inc_by(report.failed.len() as u64);
    }

    /// Refreshes the gauges from the pipeline's current state.
    pub fn observe(&self, pipeline: &CommitPipeline) {
        let snapshot = pipeline.snapshot();
        self.voice_credit_balance
            .set(i64::try_from(snapshot.balance).unwrap_or(i64::MAX));
        self.cart_size.set(snapshot.cart.len() as i64);
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
