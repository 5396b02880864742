//! Prometheus metrics for the Lightning RPC gateway.
//!
//! All metrics follow the naming convention: `ra_lnd_<metric>_<unit>`
//!
//! - **Counter**: calls dispatched and settled, labelled by call kind
//! - **Gauge**: entries currently held in the pending-call table
//! - **Histogram**: time from dispatch to settlement

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Registry holding every gateway metric
    pub static ref REGISTRY: Registry = Registry::new();

    /// Calls handed to the transport, by kind (client/internal)
    pub static ref CALLS_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("ra_lnd_calls_dispatched_total", "Calls handed to the transport"),
        &["kind"]
    ).expect("metric creation failed");

    /// Settled calls, by kind and outcome (result/remote_error/timeout/cancelled/closed)
    pub static ref CALLS_SETTLED: IntCounterVec = IntCounterVec::new(
        Opts::new("ra_lnd_calls_settled_total", "Calls removed from the pending table"),
        &["kind", "outcome"]
    ).expect("metric creation failed");

    /// Dispatches refused before reaching the transport (backpressure/transport/invalid)
    pub static ref CALLS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("ra_lnd_calls_rejected_total", "Dispatches refused by the gateway"),
        &["reason"]
    ).expect("metric creation failed");

    /// Responses dropped without a caller (stale/malformed)
    pub static ref RESPONSES_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("ra_lnd_responses_dropped_total", "Inbound responses discarded"),
        &["reason"]
    ).expect("metric creation failed");

    /// Entries currently in flight, by kind
    pub static ref CALLS_IN_FLIGHT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ra_lnd_calls_in_flight", "Entries in the pending-call table"),
        &["kind"]
    ).expect("metric creation failed");

    /// Dispatch-to-settlement latency
    pub static ref CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("ra_lnd_call_duration_seconds", "Time a call spent pending")
            .buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["kind"]
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register all gateway metrics with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> Result<(), TelemetryError> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CALLS_DISPATCHED.clone()),
        Box::new(CALLS_SETTLED.clone()),
        Box::new(CALLS_REJECTED.clone()),
        Box::new(RESPONSES_DROPPED.clone()),
        Box::new(CALLS_IN_FLIGHT.clone()),
        Box::new(CALL_DURATION.clone()),
    ];
    for collector in collectors {
        REGISTRY
            .register(collector)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
