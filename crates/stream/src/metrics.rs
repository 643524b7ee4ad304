//! Prometheus metrics for the stream client
//!
//! Per-cluster counters for decoded messages, framing failures and reconnects,
//! plus a connection gauge.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

const LABEL_CLUSTER: &str = "cluster";
const LABEL_MESSAGE_TYPE: &str = "message_type";

/// Total messages decoded per cluster and message type
static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "scaler_stream_messages_total",
        "Total messages decoded from the stream",
        &[LABEL_CLUSTER, LABEL_MESSAGE_TYPE]
    )
    .expect("Failed to register messages_total metric")
});

static DECODE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "scaler_stream_decode_failures_total",
        "Payload fragments that failed to parse",
        &[LABEL_CLUSTER]
    )
    .expect("Failed to register decode_failures_total metric")
});

static RECONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "scaler_stream_reconnects_total",
        "Reconnect attempts scheduled after an unplanned close",
        &[LABEL_CLUSTER]
    )
    .expect("Failed to register reconnects_total metric")
});

/// Connection status (1 = connected, 0 = disconnected)
static CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "scaler_stream_connected",
        "Stream connection status per cluster (1=connected, 0=disconnected)",
        &[LABEL_CLUSTER]
    )
    .expect("Failed to register connected metric")
});

/// Handle for recording metrics for one cluster stream
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    cluster: String,
}

impl StreamMetrics {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn inc_message(&self, message_type: &str) {
        MESSAGES_TOTAL
            .with_label_values(&[&self.cluster, message_type])
            .inc();
    }

    pub fn add_decode_failures(&self, count: usize) {
        DECODE_FAILURES_TOTAL
            .with_label_values(&[&self.cluster])
            .inc_by(count as u64);
    }

    pub fn inc_reconnect(&self) {
        RECONNECTS_TOTAL.with_label_values(&[&self.cluster]).inc();
    }

    pub fn set_connected(&self) {
        CONNECTED.with_label_values(&[&self.cluster]).set(1);
    }

    pub fn set_disconnected(&self) {
        CONNECTED.with_label_values(&[&self.cluster]).set(0);
    }

    /// Drop this cluster's connection series once the stream moves elsewhere.
    /// Counters stay, they are cumulative.
    pub fn remove(&self) {
        // absent when the cluster never connected
        let _ = CONNECTED.remove_label_values(&[&self.cluster]);
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}
