//! Metric hooks called by the gateway. Without the `metrics` feature these
//! compile to nothing.

#![cfg_attr(not(feature = "metrics"), allow(unused_variables))]

use crate::domain::pending::{CallKind, SettleOutcome};
use std::time::Duration;

#[cfg(feature = "metrics")]
use ra_lnd_telemetry::metrics;

/// Entry inserted and handed to the transport.
pub(crate) fn dispatched(kind: CallKind) {
    #[cfg(feature = "metrics")]
    {
        metrics::CALLS_DISPATCHED
            .with_label_values(&[kind.as_str()])
            .inc();
        metrics::CALLS_IN_FLIGHT
            .with_label_values(&[kind.as_str()])
            .inc();
    }
}

/// Entry claimed and its completion settled.
pub(crate) fn settled(kind: CallKind, outcome: SettleOutcome, elapsed: Duration) {
    #[cfg(feature = "metrics")]
    {
        metrics::CALLS_SETTLED
            .with_label_values(&[kind.as_str(), outcome.as_str()])
            .inc();
        metrics::CALLS_IN_FLIGHT
            .with_label_values(&[kind.as_str()])
            .dec();
        metrics::CALL_DURATION
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

/// Entry withdrawn after the transport refused it.
pub(crate) fn withdrawn(kind: CallKind) {
    #[cfg(feature = "metrics")]
    metrics::CALLS_IN_FLIGHT
        .with_label_values(&[kind.as_str()])
        .dec();
    rejected("transport");
}

/// Dispatch refused (`invalid`, `backpressure`, `transport`, `closed`).
pub(crate) fn rejected(reason: &str) {
    #[cfg(feature = "metrics")]
    metrics::CALLS_REJECTED.with_label_values(&[reason]).inc();
}

/// Inbound response discarded (`stale`, `malformed`).
pub(crate) fn dropped(reason: &str) {
    #[cfg(feature = "metrics")]
    metrics::RESPONSES_DROPPED.with_label_values(&[reason]).inc();
}
