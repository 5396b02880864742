//! Chaining Policy.
//!
//! Some calls need prerequisite calls first, e.g. the wallet must be loaded
//! before its balance can be read. The policy is a declared table from
//! method name to an ordered list of prerequisites; each compound call walks
//! that list one prerequisite at a time.
//!
//! ```text
//! NeedsPrerequisite ──dispatch──► PrerequisiteInFlight ──ok, more──► NeedsPrerequisite
//!                                        │ ok, last
//!                                        ▼
//!                                      Ready ──dispatch──► Dispatched ──► Completed | Failed
//!
//! PrerequisiteInFlight ──error/timeout/cancel──► Failed (visible call never sent)
//! ```

use crate::domain::correlation::CallTracker;
use crate::domain::error::{codes, CallError, GatewayError};
use crate::domain::pending::{CallResult, Responder};
use crate::domain::rpc::{RpcErrorObject, RpcRequest, RpcResponse};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Derives prerequisite parameters from the caller-visible request.
pub type ParamDeriver = Arc<dyn Fn(&RpcRequest) -> Map<String, Value> + Send + Sync>;

/// A call that must succeed before the caller-visible call is made.
#[derive(Clone)]
pub struct Prerequisite {
    pub method: String,
    pub path: String,
    params: Map<String, Value>,
    derive: Option<ParamDeriver>,
    /// Remote error codes that still count as success
    pub tolerated_error_codes: Vec<i64>,
}

impl Prerequisite {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            params: Map::new(),
            derive: None,
            tolerated_error_codes: Vec::new(),
        }
    }

    /// Fixed parameters.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Parameters computed from the visible request; merged over fixed ones.
    pub fn derive_params<F>(mut self, derive: F) -> Self
    where
        F: Fn(&RpcRequest) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.derive = Some(Arc::new(derive));
        self
    }

    /// Treat a remote error code as success.
    pub fn tolerate(mut self, code: i64) -> Self {
        self.tolerated_error_codes.push(code);
        self
    }

    pub fn build_request(&self, visible: &RpcRequest) -> RpcRequest {
        let mut params = self.params.clone();
        if let Some(derive) = &self.derive {
            params.extend(derive(visible));
        }
        RpcRequest::new(self.method.clone(), self.path.clone()).with_params(params)
    }

    /// Remote error that stops the chain; `None` lets it continue.
    pub fn rejection(&self, response: RpcResponse) -> Option<RpcErrorObject> {
        response
            .error
            .filter(|error| !self.tolerated_error_codes.contains(&error.code))
    }
}

impl fmt::Debug for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prerequisite")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("derived", &self.derive.is_some())
            .field("tolerated_error_codes", &self.tolerated_error_codes)
            .finish()
    }
}

/// Prerequisites for one method, run in order.
#[derive(Debug, Clone, Default)]
pub struct ChainDefinition {
    pub prerequisites: Vec<Prerequisite>,
}

/// Declared table of method name → prerequisite chain.
#[derive(Debug, Clone, Default)]
pub struct ChainingPolicy {
    chains: HashMap<String, ChainDefinition>,
}

impl ChainingPolicy {
    /// Policy with no chains; every call goes straight out.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> ChainingPolicyBuilder {
        ChainingPolicyBuilder::default()
    }

    /// Wallet calls on a Bitcoin Core backed node: load the wallet first.
    ///
    /// `-35` (wallet already loaded) is not a failure.
    pub fn wallet_defaults() -> Self {
        let load_wallet = Prerequisite::new("loadwallet", "/")
            .derive_params(|visible| {
                let mut params = Map::new();
                params.insert("filename".into(), Value::from(wallet_name(visible)));
                params
            })
            .tolerate(codes::WALLET_ALREADY_LOADED);

        Self::builder()
            .chain("getbalance", vec![load_wallet.clone()])
            .chain("getwalletinfo", vec![load_wallet.clone()])
            .chain("listunspent", vec![load_wallet])
            .build()
    }

    pub fn definition(&self, method: &str) -> Option<&ChainDefinition> {
        self.chains
            .get(method)
            .filter(|definition| !definition.prerequisites.is_empty())
    }

    pub fn has_chain(&self, method: &str) -> bool {
        self.definition(method).is_some()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[derive(Default)]
pub struct ChainingPolicyBuilder {
    chains: HashMap<String, ChainDefinition>,
}

impl ChainingPolicyBuilder {
    pub fn chain(mut self, method: impl Into<String>, prerequisites: Vec<Prerequisite>) -> Self {
        self.chains
            .insert(method.into(), ChainDefinition { prerequisites });
        self
    }

    pub fn build(self) -> ChainingPolicy {
        ChainingPolicy {
            chains: self.chains,
        }
    }
}

/// Wallet named by the request: `wallet` param, else the `/wallet/<name>` path.
pub fn wallet_name(request: &RpcRequest) -> String {
    if let Some(name) = request.params.get("wallet").and_then(Value::as_str) {
        return name.to_string();
    }
    let mut segments = request.path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "wallet" {
            return segments.next().unwrap_or_default().to_string();
        }
    }
    String::new()
}

/// States of a compound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    NeedsPrerequisite,
    PrerequisiteInFlight,
    Ready,
    Dispatched,
    Completed,
    Failed,
}

/// What the gateway must do next for a compound call.
#[derive(Debug)]
pub enum ChainStep {
    /// Dispatch this prerequisite as an internal call
    Prerequisite(RpcRequest),
    /// Dispatch the caller-visible request as a client call
    Visible(RpcRequest),
    /// Report this failure to the caller
    Failed(CallError),
}

/// One compound operation in progress.
///
/// Owned by the pending entry of its in-flight prerequisite; it reads only
/// the response the gateway hands it.
pub struct CompoundCall {
    visible: RpcRequest,
    remaining: VecDeque<Prerequisite>,
    in_flight: Option<Prerequisite>,
    state: ChainState,
    caller: Option<oneshot::Sender<CallResult>>,
    timeout: Option<Duration>,
    tracker: CallTracker,
}

impl CompoundCall {
    pub fn new(
        visible: RpcRequest,
        definition: &ChainDefinition,
        caller: oneshot::Sender<CallResult>,
        timeout: Option<Duration>,
    ) -> Self {
        let state = if definition.prerequisites.is_empty() {
            ChainState::Ready
        } else {
            ChainState::NeedsPrerequisite
        };
        Self {
            visible,
            remaining: definition.prerequisites.iter().cloned().collect(),
            in_flight: None,
            state,
            caller: Some(caller),
            timeout,
            tracker: CallTracker::new(),
        }
    }

    /// Share the caller's tracker so each dispatched step is followed.
    pub fn with_tracker(mut self, tracker: CallTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn visible(&self) -> &RpcRequest {
        &self.visible
    }

    /// Deadline for the visible call, if the caller chose one
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Method of the prerequisite currently awaiting its response
    pub fn in_flight_method(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|p| p.method.as_str())
    }

    fn transition(&mut self, to: ChainState) {
        debug!(
            method = %self.visible.method,
            from = ?self.state,
            to = ?to,
            "Compound call transition"
        );
        self.state = to;
    }

    /// Produce the next dispatch from `NeedsPrerequisite` or `Ready`.
    pub fn next_step(&mut self) -> ChainStep {
        match self.state {
            ChainState::NeedsPrerequisite => match self.remaining.pop_front() {
                Some(prerequisite) => {
                    let request = prerequisite.build_request(&self.visible);
                    self.in_flight = Some(prerequisite);
                    self.transition(ChainState::PrerequisiteInFlight);
                    ChainStep::Prerequisite(request)
                }
                None => {
                    self.transition(ChainState::Ready);
                    self.next_step()
                }
            },
            ChainState::Ready => {
                self.transition(ChainState::Dispatched);
                ChainStep::Visible(self.visible.clone())
            }
            state => self.illegal(state, "next_step"),
        }
    }

    /// Feed the in-flight prerequisite's response.
    pub fn advance(&mut self, response: RpcResponse) -> ChainStep {
        if self.state != ChainState::PrerequisiteInFlight {
            return self.illegal(self.state, "advance");
        }
        let prerequisite = match self.in_flight.take() {
            Some(p) => p,
            None => return self.illegal(self.state, "advance"),
        };

        let source = match prerequisite.rejection(response) {
            Some(error) => CallError::Remote(error),
            None => {
                let next = if self.remaining.is_empty() {
                    ChainState::Ready
                } else {
                    ChainState::NeedsPrerequisite
                };
                self.transition(next);
                return self.next_step();
            }
        };
        self.transition(ChainState::Failed);
        warn!(
            method = %self.visible.method,
            prerequisite = %prerequisite.method,
            error = %source,
            "Prerequisite failed; visible call not dispatched"
        );
        ChainStep::Failed(CallError::PrerequisiteFailed {
            method: prerequisite.method,
            source: Box::new(source),
        })
    }

    fn illegal(&mut self, state: ChainState, operation: &str) -> ChainStep {
        self.transition(ChainState::Failed);
        ChainStep::Failed(CallError::Dispatch(GatewayError::InvalidRequest(format!(
            "compound call cannot {operation} from {state:?}"
        ))))
    }

    /// Terminal failure: report to the caller.
    ///
    /// A failure while a prerequisite is in flight is reported as that
    /// prerequisite's failure.
    pub fn abort(mut self, error: CallError) {
        let error = match self.in_flight.take() {
            Some(prerequisite) if self.state == ChainState::PrerequisiteInFlight => {
                CallError::PrerequisiteFailed {
                    method: prerequisite.method,
                    source: Box::new(error),
                }
            }
            _ => error,
        };
        if self.state != ChainState::Failed {
            self.transition(ChainState::Failed);
        }
        if let Some(caller) = self.caller.take() {
            let _ = caller.send(Err(error));
        }
    }

    /// Hand the caller over to the visible call once it is `Dispatched`.
    pub fn into_responder(mut self) -> Option<Responder> {
        if self.state != ChainState::Dispatched {
            return None;
        }
        self.caller
            .take()
            .map(|caller| Responder::chained(caller, self.visible.method.clone()))
    }
}

impl fmt::Debug for CompoundCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundCall")
            .field("visible", &self.visible)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight_method())
            .field("remaining", &self.remaining.len())
            .finish()
    }
}
