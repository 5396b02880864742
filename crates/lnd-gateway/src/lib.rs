#![allow(missing_docs)]

//! RA Lightning gateway - correlates Lightning node RPC calls with their
//! out-of-band replies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      LIGHTNING SERVICE                           │
//! │   LND_RPC_REQUEST ──┐                     ┌── LND_RPC_RESPONSE   │
//! │                     ▼                     ▼                      │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                  Correlation Gateway                       │  │
//! │  │   Chaining Policy (loadwallet → getbalance, ...)           │  │
//! │  └───────────┬──────────────────────────────────▲─────────────┘  │
//! │              │                                  │                │
//! │  ┌───────────┴──────────────────────────────────┴─────────────┐  │
//! │  │     Pending-Call Table  (client │ internal, bounded)       │  │
//! │  └───────────┬──────────────────────────────────▲─────────────┘  │
//! └──────────────┼──────────────────────────────────┼────────────────┘
//!                ▼ Envelope                         │ InboundMessage
//!          ┌───────────┐                     ┌──────┴──────┐
//!          │ Transport │ ── HTTP POST ──►    │InboundSource│
//!          └───────────┘   node :18443       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ra_lnd_gateway::{adapters, ChainingPolicy, CorrelationGateway, GatewayConfig, RpcRequest};
//!
//! let config = GatewayConfig::from_env()?;
//! let (transport, inbound) = adapters::http_transport(config.timeouts.default, 256)?;
//! let gateway = Arc::new(
//!     CorrelationGateway::new(&config, Arc::new(transport))?
//!         .with_policy(ChainingPolicy::wallet_defaults()),
//! );
//! tokio::spawn(ResponseListener::new(gateway.clone(), Arc::new(inbound)).run());
//!
//! let balance = gateway.call(RpcRequest::new("getbalance", "/wallet/alice")).await?;
//! ```
//!
//! # Guarantees
//!
//! - Each call settles exactly once: result, remote error, timeout,
//!   cancellation or shutdown
//! - Dispatch is all-or-nothing; a refused envelope leaves no entry behind
//! - The table never holds more than `limits.max_in_flight` entries
//! - A failed prerequisite means the caller-visible call is never sent

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod gateway;
mod instrument;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use domain::chaining::{ChainingPolicy, Prerequisite};
pub use domain::config::{Environment, GatewayConfig};
pub use domain::correlation::CorrelationId;
pub use domain::error::{CallError, GatewayError, GatewayResult};
pub use domain::rpc::{RequestValue, RpcErrorObject, RpcRequest, RpcResponse};
pub use gateway::{expiry_task, CorrelationGateway, PendingCall, ResponseDisposition, ResponseListener};
pub use ports::outbound::{Envelope, InboundMessage, InboundSource, TimeSource, Transport};
pub use service::{Document, Handled, LightningService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent to the node
pub fn client_version() -> String {
    format!("ra-lnd-gateway/v{}", VERSION)
}
