//! Correlation Gateway.
//!
//! Mints a correlation id per outbound call, records it in the
//! [`PendingCallTable`], hands an envelope to the [`Transport`] and, when a
//! reply tagged with that id comes back, claims the entry and settles it.
//!
//! ```text
//! submit ──► dispatch ──► table.insert ──► transport.submit
//!                                               │ (async)
//! ResponseListener ◄── InboundSource ◄──────────┘
//!        │
//!        └─► on_response ──► table.claim ──► Client:   settle caller
//!                                         └► Internal: CompoundCall::advance ──► dispatch
//!
//! expiry_task ──► expire_overdue ──► table.claim_if_expired ──► TimedOut
//! ```
//!
//! Every path that removes an entry goes through a single atomic claim, so
//! each call settles exactly once whichever of response, deadline,
//! cancellation or shutdown gets there first.

use crate::domain::chaining::{ChainStep, ChainingPolicy, CompoundCall};
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::correlation::{CallTracker, CorrelationId};
use crate::domain::error::{CallError, GatewayError, GatewayResult};
use crate::domain::pending::{
    CallKind, CallResult, Completion, PendingCallTable, PendingEntry, Responder, SettleOutcome,
};
use crate::domain::rpc::{RpcRequest, RpcResponse};
use crate::instrument;
use crate::ports::outbound::{
    Action, Envelope, InboundSource, ReplyRoute, SystemTimeSource, TimeSource, Transport,
    TransportError, AUTHORIZATION, CONTENT_TYPE, CONTENT_TYPE_JSON,
};
use bytes::Bytes;
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

/// Service replies are routed back to.
pub const REPLY_SERVICE: &str = "ra.lnd.LightningService";
/// Operation replies are routed back to.
pub const REPLY_OPERATION: &str = "LND_RPC_RESPONSE";

/// What [`CorrelationGateway::on_response`] did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Result delivered to the caller
    Delivered,
    /// Remote error delivered to the caller
    RemoteError,
    /// Prerequisite reply handed to its compound call
    Chained,
    /// No pending entry; discarded
    Stale,
    /// Undecodable; discarded and the entry left to its deadline
    Malformed,
}

/// Caller's handle on one submitted call.
#[derive(Debug)]
pub struct PendingCall {
    first: CorrelationId,
    tracker: CallTracker,
    receiver: oneshot::Receiver<CallResult>,
}

impl PendingCall {
    /// Id of the step currently pending. A chained call starts on its first
    /// prerequisite and moves to the caller-visible call once that is sent.
    pub fn id(&self) -> CorrelationId {
        self.tracker.current().unwrap_or(self.first)
    }

    /// Cancel whichever step is pending; a chain stops before its next step.
    ///
    /// False if no step was pending to withdraw.
    pub fn cancel(&self, gateway: &CorrelationGateway) -> bool {
        match self.tracker.cancel() {
            Some(id) => gateway.cancel(id),
            None => false,
        }
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> CallResult {
        self.receiver.await.unwrap_or(Err(CallError::Closed))
    }

    /// Outcome if already settled.
    pub fn try_result(&mut self) -> Option<CallResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(CallError::Closed)),
        }
    }
}

/// Correlates outbound calls with their out-of-band replies.
pub struct CorrelationGateway {
    table: PendingCallTable,
    transport: Arc<dyn Transport>,
    policy: ChainingPolicy,
    clock: Arc<dyn TimeSource>,
    base_url: Url,
    authorization: String,
    default_timeout: Duration,
    closed: AtomicBool,
}

impl CorrelationGateway {
    pub fn new(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            table: PendingCallTable::new(config.limits.max_in_flight),
            transport,
            policy: ChainingPolicy::empty(),
            clock: Arc::new(SystemTimeSource),
            base_url: config.node.rpc_url()?,
            authorization: config.node.authorization.clone(),
            default_timeout: config.timeouts.default,
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_policy(mut self, policy: ChainingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &PendingCallTable {
        &self.table
    }

    pub fn policy(&self) -> &ChainingPolicy {
        &self.policy
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand one call to the transport.
    ///
    /// Returns as soon as the transport accepted the envelope. On any error
    /// the completion is failed with the same error and no entry remains.
    pub async fn dispatch(
        &self,
        request: RpcRequest,
        completion: Completion,
        timeout: Option<Duration>,
    ) -> GatewayResult<CorrelationId> {
        self.dispatch_tracked(request, completion, timeout, None).await
    }

    async fn dispatch_tracked(
        &self,
        request: RpcRequest,
        completion: Completion,
        timeout: Option<Duration>,
        tracker: Option<&CallTracker>,
    ) -> GatewayResult<CorrelationId> {
        let kind = completion.kind();
        let id = CorrelationId::new();

        let envelope = match self.admit(&request, id) {
            Ok(envelope) => envelope,
            Err(e) => return Err(self.refuse(completion, e)),
        };
        let reservation = match self.table.try_reserve() {
            Ok(reservation) => reservation,
            Err(e) => {
                warn!(method = %request.method, kind = %kind, error = %e, "Dispatch rejected");
                return Err(self.refuse(completion, e));
            }
        };

        let method = request.method.clone();
        let deadline = timeout.unwrap_or(self.default_timeout);
        let entry = PendingEntry::new(id, request, completion, self.clock.now(), deadline);
        if let Err(entry) = self.table.insert(reservation, entry) {
            let entry = *entry;
            let e = GatewayError::InvalidRequest(format!("correlation id {id} already pending"));
            error!(correlation_id = %id, "Correlation id collision");
            return Err(self.refuse(entry.completion, e));
        }
        instrument::dispatched(kind);
        if let Some(tracker) = tracker {
            if !tracker.track(id) {
                // Cancelled between steps; withdraw before anything is sent.
                self.cancel(id);
                return Ok(id);
            }
        }

        if let Err(e) = self.transport.submit(envelope).await {
            let e = transport_error(e);
            warn!(correlation_id = %id, method = %method, error = %e, "Transport refused envelope");
            if let Some(entry) = self.table.claim(&id) {
                instrument::withdrawn(kind);
                entry.completion.fail(CallError::Dispatch(e.clone()));
            }
            return Err(e);
        }

        debug!(
            correlation_id = %id,
            method = %method,
            kind = %kind,
            deadline_ms = deadline.as_millis() as u64,
            "Dispatched call"
        );
        Ok(id)
    }

    fn admit(&self, request: &RpcRequest, id: CorrelationId) -> GatewayResult<Envelope> {
        if self.is_closed() {
            return Err(GatewayError::Closed);
        }
        request.validate()?;
        self.envelope(request, id)
    }

    fn refuse(&self, completion: Completion, error: GatewayError) -> GatewayError {
        instrument::rejected(rejection_reason(&error));
        completion.fail(CallError::Dispatch(error.clone()));
        error
    }

    fn envelope(&self, request: &RpcRequest, id: CorrelationId) -> GatewayResult<Envelope> {
        let url = self.base_url.join(&request.path).map_err(|e| {
            GatewayError::TransportUnavailable(format!("target {}: {e}", request.path))
        })?;
        let body = request
            .to_json()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let mut headers = BTreeMap::new();
        headers.insert(AUTHORIZATION.to_string(), self.authorization.clone());
        headers.insert(CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());

        Ok(Envelope {
            correlation_id: id,
            url,
            action: Action::Post,
            headers,
            body: Bytes::from(body),
            reply_route: ReplyRoute::new(REPLY_SERVICE, REPLY_OPERATION),
        })
    }

    /// Submit a client call with the default deadline.
    pub async fn submit(&self, request: RpcRequest) -> GatewayResult<PendingCall> {
        self.submit_with_timeout(request, None).await
    }

    pub async fn submit_with_timeout(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> GatewayResult<PendingCall> {
        let (tx, receiver) = oneshot::channel();
        let tracker = CallTracker::new();
        let first = self
            .dispatch_tracked(request, Completion::Client(Responder::new(tx)), timeout, Some(&tracker))
            .await?;
        Ok(PendingCall {
            first,
            tracker,
            receiver,
        })
    }

    /// Submit and wait for the outcome.
    pub async fn call(&self, request: RpcRequest) -> CallResult {
        match self.submit_chained(request, None).await {
            Ok(pending) => pending.wait().await,
            Err(e) => Err(CallError::Dispatch(e)),
        }
    }

    /// Submit through the chaining policy: methods with prerequisites start
    /// a compound call, everything else goes straight out.
    ///
    /// `timeout` applies to the caller-visible call; prerequisites use the
    /// default deadline.
    pub async fn submit_chained(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> GatewayResult<PendingCall> {
        let definition = match self.policy.definition(&request.method) {
            Some(definition) => definition,
            None => return self.submit_with_timeout(request, timeout).await,
        };
        request.validate()?;

        let (tx, receiver) = oneshot::channel();
        let tracker = CallTracker::new();
        let mut compound =
            CompoundCall::new(request, definition, tx, timeout).with_tracker(tracker.clone());
        let first = match compound.next_step() {
            ChainStep::Prerequisite(prerequisite) => {
                self.dispatch_tracked(prerequisite, Completion::Internal(compound), None, Some(&tracker))
                    .await?
            }
            step => {
                let e = GatewayError::InvalidRequest(format!("compound call did not start: {step:?}"));
                compound.abort(CallError::Dispatch(e.clone()));
                return Err(e);
            }
        };
        Ok(PendingCall {
            first,
            tracker,
            receiver,
        })
    }

    /// Carry out the next step of a compound call.
    async fn continue_chain(&self, compound: CompoundCall, step: ChainStep) -> GatewayResult<()> {
        let tracker = compound.tracker().clone();
        match step {
            ChainStep::Prerequisite(request) => {
                self.dispatch_tracked(request, Completion::Internal(compound), None, Some(&tracker))
                    .await?;
            }
            ChainStep::Visible(request) => {
                let timeout = compound.timeout();
                match compound.into_responder() {
                    Some(responder) => {
                        self.dispatch_tracked(request, Completion::Client(responder), timeout, Some(&tracker))
                            .await?;
                    }
                    None => {
                        error!(method = %request.method, "Compound call has no caller to hand over");
                    }
                }
            }
            ChainStep::Failed(error) => compound.abort(error),
        }
        Ok(())
    }

    /// Route reply bytes to the call they answer.
    pub async fn on_response(&self, id: CorrelationId, raw: &[u8]) -> ResponseDisposition {
        let response = match RpcResponse::decode(raw) {
            Ok(response) => response,
            Err(e) => {
                warn!(correlation_id = %id, error = %e, "Discarding malformed response");
                self.table
                    .stats()
                    .total_malformed
                    .fetch_add(1, Ordering::Relaxed);
                instrument::dropped("malformed");
                return ResponseDisposition::Malformed;
            }
        };

        let entry = match self.table.claim(&id) {
            Some(entry) => entry,
            None => {
                warn!(correlation_id = %id, "Stale response: no pending call");
                self.table.stats().total_stale.fetch_add(1, Ordering::Relaxed);
                instrument::dropped("stale");
                return ResponseDisposition::Stale;
            }
        };
        let elapsed = entry.age(self.clock.now());
        let method = entry.request.method;

        match entry.completion {
            Completion::Client(responder) => {
                let (outcome, disposition, result) = match response.into_result() {
                    Ok(value) => (SettleOutcome::Result, ResponseDisposition::Delivered, Ok(value)),
                    Err(error) => (
                        SettleOutcome::RemoteError,
                        ResponseDisposition::RemoteError,
                        Err(CallError::Remote(error)),
                    ),
                };
                self.settled(CallKind::Client, outcome, elapsed);
                if !responder.settle(result) {
                    debug!(correlation_id = %id, method = %method, "Caller no longer waiting");
                }
                debug!(correlation_id = %id, method = %method, outcome = outcome.as_str(), "Settled call");
                disposition
            }
            Completion::Internal(mut compound) => {
                self.settled(CallKind::Internal, SettleOutcome::Chained, elapsed);
                let step = compound.advance(response);
                if let Err(e) = self.continue_chain(compound, step).await {
                    debug!(correlation_id = %id, method = %method, error = %e, "Chain continuation not dispatched");
                }
                ResponseDisposition::Chained
            }
        }
    }

    /// Expire one call regardless of its deadline. False if it already settled.
    pub fn on_timeout(&self, id: CorrelationId) -> bool {
        match self.table.claim(&id) {
            Some(entry) => {
                self.expire(entry);
                true
            }
            None => false,
        }
    }

    /// Expire every call whose deadline has passed; returns how many.
    pub fn expire_overdue(&self) -> usize {
        let now = self.clock.now();
        self.table
            .expired_ids(now)
            .iter()
            .filter_map(|id| self.table.claim_if_expired(id, now))
            .map(|entry| self.expire(entry))
            .count()
    }

    fn expire(&self, entry: PendingEntry) {
        let elapsed = entry.age(self.clock.now());
        warn!(
            correlation_id = %entry.id,
            method = %entry.request.method,
            kind = %entry.kind,
            deadline_ms = entry.deadline.as_millis() as u64,
            "Call timed out"
        );
        self.settled(entry.kind, SettleOutcome::Timeout, elapsed);
        entry.completion.fail(CallError::TimedOut {
            method: entry.request.method,
            after: entry.deadline,
        });
    }

    /// Cancel a pending call. Cancelling a prerequisite fails its compound call.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        match self.table.claim(&id) {
            Some(entry) => {
                info!(correlation_id = %id, method = %entry.request.method, kind = %entry.kind, "Call cancelled");
                let elapsed = entry.age(self.clock.now());
                self.settled(entry.kind, SettleOutcome::Cancelled, elapsed);
                entry.completion.fail(CallError::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Refuse new dispatches and fail everything still pending with `Closed`.
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let now = self.clock.now();
        let drained = self.table.drain();
        let count = drained.len();
        for entry in drained {
            self.settled(entry.kind, SettleOutcome::Closed, entry.age(now));
            entry.completion.fail(CallError::Closed);
        }
        if count > 0 {
            info!(drained = count, "Failed pending calls at shutdown");
        }
        count
    }

    fn settled(&self, kind: CallKind, outcome: SettleOutcome, elapsed: Duration) {
        self.table.stats().record(outcome);
        instrument::settled(kind, outcome, elapsed);
    }
}

fn transport_error(error: TransportError) -> GatewayError {
    GatewayError::TransportUnavailable(error.to_string())
}

fn rejection_reason(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::InvalidRequest(_) => "invalid",
        GatewayError::TransportUnavailable(_) => "transport",
        GatewayError::BackpressureRejected { .. } => "backpressure",
        GatewayError::Closed => "closed",
    }
}

/// Reads replies from the inbound source and feeds them to the gateway.
pub struct ResponseListener {
    gateway: Arc<CorrelationGateway>,
    source: Arc<dyn InboundSource>,
}

impl ResponseListener {
    pub fn new(gateway: Arc<CorrelationGateway>, source: Arc<dyn InboundSource>) -> Self {
        Self { gateway, source }
    }

    /// Run until the source closes.
    pub async fn run(self) {
        loop {
            match self.source.receive().await {
                Ok(message) => {
                    self.gateway
                        .on_response(message.correlation_id, &message.body)
                        .await;
                }
                Err(TransportError::Closed) => {
                    info!("Inbound source closed, stopping response listener");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Error receiving response");
                }
            }
        }
    }
}

/// Background task sweeping overdue calls.
pub async fn expiry_task(gateway: Arc<CorrelationGateway>, interval: Duration) {
    let mut sweep = tokio::time::interval(interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        if gateway.is_closed() {
            break;
        }
        let expired = gateway.expire_overdue();
        if expired > 0 {
            debug!(expired = expired, "Expired overdue calls");
        }
    }
}
