//! # RA Lightning Telemetry
//!
//! Observability for the Lightning RPC gateway.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter and either a
//!   human-readable or a JSON formatter
//! - **Metrics**: Prometheus counters, gauges and histograms for the
//!   pending-call table (feature `metrics`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ra_lnd_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RA_SERVICE_NAME` | `ra-lnd-gateway` | Service name attached to logs |
//! | `RA_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `RA_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `RA_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;
#[cfg(feature = "metrics")]
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and (when enabled) register the gateway metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    #[cfg(feature = "metrics")]
    metrics::register_metrics()?;

    let logging = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logging: logging,
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingHandle,
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Span carrying the correlation id of a single call.
///
/// ```rust,ignore
/// let _span = call_span!("dispatch", correlation_id = %id, method = "getbalance");
/// ```
#[macro_export]
macro_rules! call_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
