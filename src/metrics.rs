// Prometheus metrics

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct Metrics {
    pub registry: Registry,

    // Dispatch counters
    pub actions_total: IntCounterVec,
    pub action_duration: HistogramVec,
    pub rejections_total: IntCounterVec,

    // Payload sizes
    pub received_bytes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let actions_total = IntCounterVec::new(
            Opts::new("editor_actions_total", "Total number of dispatched actions"),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(actions_total.clone()))?;

        let action_duration = HistogramVec::new(
            HistogramOpts::new(
                "editor_action_duration_seconds",
                "Action execution time in seconds",
            ),
            &["action"],
        )?;
        registry.register(Box::new(action_duration.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "editor_rejections_total",
                "Requests rejected before an action ran",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let received_bytes = IntCounterVec::new(
            Opts::new(
                "editor_received_bytes_total",
                "Total bytes received in multipart file parts",
            ),
            &["action"],
        )?;
        registry.register(Box::new(received_bytes.clone()))?;

        Ok(Self {
            registry,
            actions_total,
            action_duration,
            rejections_total,
            received_bytes,
        })
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<Metrics>;
