//! Outbound ports for the gateway.

use crate::domain::correlation::CorrelationId;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Transport verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Post,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Post => "POST",
        }
    }
}

/// Service and operation a reply is routed back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRoute {
    pub service: String,
    pub operation: String,
}

impl ReplyRoute {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }
}

/// One addressed unit of work for the transport.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Tag the reply carries back
    pub correlation_id: CorrelationId,
    pub url: Url,
    pub action: Action,
    pub headers: BTreeMap<String, String>,
    /// Serialized request
    pub body: Bytes,
    pub reply_route: ReplyRoute,
}

impl Envelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Reply bytes tagged with the correlation id of the call they answer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub correlation_id: CorrelationId,
    pub body: Bytes,
}

impl InboundMessage {
    pub fn new(correlation_id: CorrelationId, body: impl Into<Bytes>) -> Self {
        Self {
            correlation_id,
            body: body.into(),
        }
    }
}

/// Transport error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("transport rejected envelope: {0}")]
    Rejected(String),
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),
}

/// Accepts envelopes for delivery. Must not wait for the reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Source of reply bytes.
#[async_trait]
pub trait InboundSource: Send + Sync {
    /// Next reply; `Err(Closed)` once no more can arrive.
    async fn receive(&self) -> Result<InboundMessage, TransportError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
