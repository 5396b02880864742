//! Gateway error types with JSON-RPC error codes.
//!
//! Two surfaces: [`GatewayError`] is returned synchronously from dispatch,
//! [`CallError`] travels through a call's completion channel.

use crate::domain::rpc::RpcErrorObject;
use std::time::Duration;

/// JSON-RPC error codes used when a gateway failure is reported as a
/// structured error.
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i64 = -32000;
    pub const RESOURCE_UNAVAILABLE: i64 = -32002;
    pub const LIMIT_EXCEEDED: i64 = -32005;
    pub const TIMEOUT: i64 = -32006;
    pub const CANCELLED: i64 = -32007;

    // Bitcoin Core wallet errors
    pub const WALLET_NOT_FOUND: i64 = -18;
    pub const WALLET_ALREADY_LOADED: i64 = -35;
}

/// Errors surfaced at the call site of a dispatch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Request failed validation or could not be inflated
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport refused the envelope (bad target address, closed queue)
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Pending-call table is at its configured ceiling
    #[error("backpressure: {limit} calls already in flight")]
    BackpressureRejected { limit: usize },

    /// Gateway has been shut down
    #[error("gateway is shut down")]
    Closed,
}

impl GatewayError {
    /// JSON-RPC code for reporting this error to a caller
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::InvalidRequest(_) => codes::INVALID_REQUEST,
            GatewayError::TransportUnavailable(_) => codes::RESOURCE_UNAVAILABLE,
            GatewayError::BackpressureRejected { .. } => codes::LIMIT_EXCEEDED,
            GatewayError::Closed => codes::SERVER_ERROR,
        }
    }
}

/// Failures delivered asynchronously through a call's completion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The remote node answered with an error object
    #[error("remote error [{}] {}", .0.code, .0.message)]
    Remote(RpcErrorObject),

    /// No response arrived before the deadline
    #[error("call to {method} timed out after {after:?}")]
    TimedOut { method: String, after: Duration },

    /// Caller cancelled the call
    #[error("call cancelled")]
    Cancelled,

    /// A prerequisite of a compound call failed; the visible call was never sent
    #[error("prerequisite {method} failed: {source}")]
    PrerequisiteFailed {
        method: String,
        source: Box<CallError>,
    },

    /// Dispatch of a follow-up call failed
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] GatewayError),

    /// Gateway shut down while the call was pending
    #[error("gateway closed before the call settled")]
    Closed,
}

impl CallError {
    /// JSON-RPC code for this failure
    pub fn code(&self) -> i64 {
        match self {
            CallError::Remote(e) => e.code,
            CallError::TimedOut { .. } => codes::TIMEOUT,
            CallError::Cancelled => codes::CANCELLED,
            CallError::PrerequisiteFailed { source, .. } => source.code(),
            CallError::Dispatch(e) => e.code(),
            CallError::Closed => codes::SERVER_ERROR,
        }
    }

    /// True when the remote node itself produced the error
    pub fn is_remote(&self) -> bool {
        match self {
            CallError::Remote(_) => true,
            CallError::PrerequisiteFailed { source, .. } => source.is_remote(),
            _ => false,
        }
    }
}

impl From<CallError> for RpcErrorObject {
    fn from(error: CallError) -> Self {
        match error {
            CallError::Remote(e) => e,
            other => RpcErrorObject::new(other.code(), other.to_string()),
        }
    }
}

/// Inbound response bytes that could not be decoded. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResponseError {
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ResponseError {
    fn from(e: serde_json::Error) -> Self {
        ResponseError::Malformed(e.to_string())
    }
}

/// Result type for dispatch operations
pub type GatewayResult<T> = Result<T, GatewayError>;
