//! Pending-Call Table.
//!
//! Maps correlation IDs to in-flight calls until a response, deadline or
//! cancellation claims them. Client-visible calls and internally chained
//! prerequisite calls live in separate maps.
//!
//! Removal happens only through [`PendingCallTable::claim`] and
//! [`PendingCallTable::claim_if_expired`], both atomic compare-and-remove
//! operations on the shard holding the entry. Whoever claims an entry owns
//! its completion, so a call is settled exactly once.

use crate::domain::chaining::{ChainState, CompoundCall};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{CallError, GatewayError};
use crate::domain::rpc::RpcRequest;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// What a caller eventually observes for one call.
pub type CallResult = Result<serde_json::Value, CallError>;

/// Which map an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Issued on behalf of a caller that awaits the result
    Client,
    /// Prerequisite issued by a compound call
    Internal,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Client => "client",
            CallKind::Internal => "internal",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entry left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Result,
    RemoteError,
    Chained,
    Timeout,
    Cancelled,
    Closed,
}

impl SettleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettleOutcome::Result => "result",
            SettleOutcome::RemoteError => "remote_error",
            SettleOutcome::Chained => "chained",
            SettleOutcome::Timeout => "timeout",
            SettleOutcome::Cancelled => "cancelled",
            SettleOutcome::Closed => "closed",
        }
    }
}

/// Sending half of a caller's completion channel.
#[derive(Debug)]
pub struct Responder {
    sender: oneshot::Sender<CallResult>,
    /// Method of the compound call this responder finishes, if any
    chain: Option<String>,
}

impl Responder {
    pub fn new(sender: oneshot::Sender<CallResult>) -> Self {
        Self {
            sender,
            chain: None,
        }
    }

    /// Responder for the visible call of a compound operation.
    pub(crate) fn chained(sender: oneshot::Sender<CallResult>, method: String) -> Self {
        Self {
            sender,
            chain: Some(method),
        }
    }

    /// Deliver the outcome. Returns false if the caller stopped listening.
    pub fn settle(self, result: CallResult) -> bool {
        if let Some(method) = &self.chain {
            let state = if result.is_ok() {
                ChainState::Completed
            } else {
                ChainState::Failed
            };
            debug!(method = %method, from = ?ChainState::Dispatched, to = ?state, "Compound call settled");
        }
        self.sender.send(result).is_ok()
    }
}

/// Owner of an entry's outcome.
#[derive(Debug)]
pub enum Completion {
    Client(Responder),
    Internal(CompoundCall),
}

impl Completion {
    pub fn kind(&self) -> CallKind {
        match self {
            Completion::Client(_) => CallKind::Client,
            Completion::Internal(_) => CallKind::Internal,
        }
    }

    /// Settle with a failure. Internal completions abort their chain.
    pub fn fail(self, error: CallError) {
        match self {
            Completion::Client(responder) => {
                responder.settle(Err(error));
            }
            Completion::Internal(compound) => compound.abort(error),
        }
    }
}

/// A call waiting for its response.
#[derive(Debug)]
pub struct PendingEntry {
    pub id: CorrelationId,
    pub request: RpcRequest,
    pub kind: CallKind,
    pub created_at: Instant,
    pub deadline: Duration,
    pub completion: Completion,
}

impl PendingEntry {
    pub fn new(
        id: CorrelationId,
        request: RpcRequest,
        completion: Completion,
        created_at: Instant,
        deadline: Duration,
    ) -> Self {
        Self {
            id,
            request,
            kind: completion.kind(),
            created_at,
            deadline,
            completion,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.deadline
    }
}

/// Statistics for the pending-call table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Entries inserted
    pub total_registered: AtomicU64,
    /// Calls that delivered a result
    pub total_completed: AtomicU64,
    /// Calls that delivered a remote error
    pub total_remote_errors: AtomicU64,
    /// Internal calls handed to their chain continuation
    pub total_chained: AtomicU64,
    /// Entries removed by deadline
    pub total_timeouts: AtomicU64,
    /// Entries removed by cancellation
    pub total_cancelled: AtomicU64,
    /// Entries failed at shutdown
    pub total_closed: AtomicU64,
    /// Responses with no matching entry
    pub total_stale: AtomicU64,
    /// Responses that did not decode
    pub total_malformed: AtomicU64,
    /// Dispatches refused at the ceiling
    pub total_rejected: AtomicU64,
}

impl PendingStats {
    pub fn record(&self, outcome: SettleOutcome) {
        let counter = match outcome {
            SettleOutcome::Result => &self.total_completed,
            SettleOutcome::RemoteError => &self.total_remote_errors,
            SettleOutcome::Chained => &self.total_chained,
            SettleOutcome::Timeout => &self.total_timeouts,
            SettleOutcome::Cancelled => &self.total_cancelled,
            SettleOutcome::Closed => &self.total_closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// A reserved slot under the in-flight ceiling.
///
/// Consumed by [`PendingCallTable::insert`]; dropping it unused releases the slot.
#[must_use]
pub struct SlotReservation<'a> {
    table: &'a PendingCallTable,
    armed: bool,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.table.release_slot();
        }
    }
}

/// Pending-call table with a bounded number of in-flight entries.
pub struct PendingCallTable {
    client: DashMap<CorrelationId, PendingEntry>,
    internal: DashMap<CorrelationId, PendingEntry>,
    /// Reserved plus occupied slots across both maps
    in_flight: AtomicUsize,
    max_in_flight: usize,
    stats: PendingStats,
}

impl PendingCallTable {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            client: DashMap::new(),
            internal: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight,
            stats: PendingStats::default(),
        }
    }

    /// Reserve room for one entry, or fail with `BackpressureRejected`.
    pub fn try_reserve(&self) -> Result<SlotReservation<'_>, GatewayError> {
        let max = self.max_in_flight;
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map(|_| SlotReservation {
                table: self,
                armed: true,
            })
            .map_err(|_| {
                self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
                GatewayError::BackpressureRejected { limit: max }
            })
    }

    /// Insert an entry into the map selected by its kind.
    ///
    /// Hands the entry back if its id is already present in either map.
    pub fn insert(
        &self,
        mut reservation: SlotReservation<'_>,
        entry: PendingEntry,
    ) -> Result<(), Box<PendingEntry>> {
        let id = entry.id;
        let (target, other) = match entry.kind {
            CallKind::Client => (&self.client, &self.internal),
            CallKind::Internal => (&self.internal, &self.client),
        };
        if other.contains_key(&id) {
            return Err(Box::new(entry));
        }
        match target.entry(id) {
            Entry::Occupied(_) => Err(Box::new(entry)),
            Entry::Vacant(slot) => {
                let kind = entry.kind;
                slot.insert(entry);
                reservation.armed = false;
                self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, kind = %kind, "Registered pending call");
                Ok(())
            }
        }
    }

    /// Atomically remove an entry from whichever map holds it.
    pub fn claim(&self, id: &CorrelationId) -> Option<PendingEntry> {
        let claimed = self
            .client
            .remove(id)
            .or_else(|| self.internal.remove(id))
            .map(|(_, entry)| entry);
        if claimed.is_some() {
            self.release_slot();
        }
        claimed
    }

    /// Atomically remove an entry only if its deadline has passed at `now`.
    pub fn claim_if_expired(&self, id: &CorrelationId, now: Instant) -> Option<PendingEntry> {
        let claimed = self
            .client
            .remove_if(id, |_, entry| entry.is_expired(now))
            .or_else(|| self.internal.remove_if(id, |_, entry| entry.is_expired(now)))
            .map(|(_, entry)| entry);
        if claimed.is_some() {
            self.release_slot();
        }
        claimed
    }

    /// Ids whose deadline has passed at `now`. Entries may be claimed
    /// elsewhere before the caller acts on the list.
    pub fn expired_ids(&self, now: Instant) -> Vec<CorrelationId> {
        self.client
            .iter()
            .chain(self.internal.iter())
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Claim every entry.
    pub fn drain(&self) -> Vec<PendingEntry> {
        let ids: Vec<CorrelationId> = self
            .client
            .iter()
            .chain(self.internal.iter())
            .map(|entry| *entry.key())
            .collect();
        ids.iter().filter_map(|id| self.claim(id)).collect()
    }

    fn release_slot(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Entries currently held in both maps
    pub fn len(&self) -> usize {
        self.client.len() + self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn client_count(&self) -> usize {
        self.client.len()
    }

    pub fn internal_count(&self) -> usize {
        self.internal.len()
    }

    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.client.contains_key(id) || self.internal.contains_key(id)
    }

    /// Kind of a pending entry, if present
    pub fn kind_of(&self, id: &CorrelationId) -> Option<CallKind> {
        if self.client.contains_key(id) {
            Some(CallKind::Client)
        } else if self.internal.contains_key(id) {
            Some(CallKind::Internal)
        } else {
            None
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
