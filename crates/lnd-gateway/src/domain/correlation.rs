//! Correlation ID for matching out-of-band responses to pending calls.
//!
//! Uses random UUID v4 values; the id is a map key and nothing more.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation ID minted once per dispatch attempt.
///
/// A retried [`RpcRequest`](crate::domain::rpc::RpcRequest) gets a fresh id on
/// every attempt; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form carried in reply routes
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Follows the call a submission currently has in the table.
///
/// A chained submission moves from one correlation id to the next as each
/// step is dispatched; the caller's handle and the compound call share one
/// tracker. Once cancelled, no further step may be tracked.
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    inner: Arc<Mutex<TrackedCall>>,
}

#[derive(Debug, Default)]
struct TrackedCall {
    current: Option<CorrelationId>,
    cancelled: bool,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the step most recently entered in the table
    pub fn current(&self) -> Option<CorrelationId> {
        self.inner.lock().current
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Record a newly pending step. False once the submission is cancelled.
    pub fn track(&self, id: CorrelationId) -> bool {
        let mut call = self.inner.lock();
        if call.cancelled {
            return false;
        }
        call.current = Some(id);
        true
    }

    /// Mark the submission cancelled and return the step to withdraw.
    pub fn cancel(&self) -> Option<CorrelationId> {
        let mut call = self.inner.lock();
        call.cancelled = true;
        call.current
    }
}
