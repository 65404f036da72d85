//! Prometheus metrics for the broadcast service.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "pulse";

lazy_static! {
    /// Invocations handled, by routed event kind
    pub static ref INVOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_invocations_total", METRIC_PREFIX),
        "Invocations handled, by routed event kind",
        &["kind"]
    ).unwrap();

    /// Invocations that ended in a structured error response
    pub static ref INVOCATION_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_invocation_failures_total", METRIC_PREFIX),
        "Invocations that ended in a structured error response"
    ).unwrap();

    /// Live connections observed by the most recent registry pass
    pub static ref CONNECTIONS_LIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_live", METRIC_PREFIX),
        "Live connections observed by the most recent registry pass"
    ).unwrap();

    /// Broadcast payloads sent to connections
    pub static ref BROADCAST_SENDS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_sends_total", METRIC_PREFIX),
        "Broadcast payloads sent to connections"
    ).unwrap();

    /// Broadcast sends that failed and were skipped
    pub static ref BROADCAST_SEND_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_send_failures_total", METRIC_PREFIX),
        "Broadcast sends that failed and were skipped"
    ).unwrap();

    /// Stale connection rows evicted from the registry
    pub static ref STALE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stale_evictions_total", METRIC_PREFIX),
        "Stale connection rows evicted from the registry"
    ).unwrap();

    /// Successful broadcaster lease acquisitions
    pub static ref LEASE_ACQUISITIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_lease_acquisitions_total", METRIC_PREFIX),
        "Successful broadcaster lease acquisitions"
    ).unwrap();

    /// Acquisition attempts that found the lease already held
    pub static ref LEASE_CONTENTION_TOTAL: IntCounter = register_int_counter!(
        format!("{}_lease_contention_total", METRIC_PREFIX),
        "Acquisition attempts that found the lease already held"
    ).unwrap();

    /// Self-continuation invocations dispatched
    pub static ref CONTINUATIONS_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_continuations_dispatched_total", METRIC_PREFIX),
        "Self-continuation invocations dispatched"
    ).unwrap();

    /// Duration of one full registry pass
    pub static ref SWEEP_DURATION_SECONDS: Histogram = register_histogram!(
        format!("{}_sweep_duration_seconds", METRIC_PREFIX),
        "Duration of one full registry pass in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Log lines shipped to the blob store
    pub static ref LOG_LINES_SHIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_log_lines_shipped_total", METRIC_PREFIX),
        "Log lines shipped to the blob store"
    ).unwrap();

    /// Log flushes that failed and were retried later
    pub static ref LOG_FLUSH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_log_flush_failures_total", METRIC_PREFIX),
        "Log flushes that failed and were retried later"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
