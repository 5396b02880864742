//! Domain types for the Lightning RPC gateway.
//!
//! Correlation ids, the RPC model, the pending-call table, the chaining
//! policy, configuration and errors. Nothing here performs I/O.

pub mod chaining;
pub mod config;
pub mod correlation;
pub mod error;
pub mod pending;
pub mod rpc;

// Re-exports for convenience
pub use chaining::{ChainDefinition, ChainState, ChainStep, ChainingPolicy, CompoundCall, Prerequisite};
pub use config::{ConfigError, Environment, GatewayConfig, LimitsConfig, NodeConfig, TimeoutConfig};
pub use correlation::{CallTracker, CorrelationId};
pub use error::{codes, CallError, GatewayError, GatewayResult, ResponseError};
pub use pending::{CallKind, CallResult, Completion, PendingCallTable, PendingEntry, PendingStats, Responder};
pub use rpc::{RequestValue, RpcErrorObject, RpcRequest, RpcResponse};
