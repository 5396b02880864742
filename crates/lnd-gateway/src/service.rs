//! Lightning service: routes inbound documents by operation.
//!
//! - `LND_RPC_REQUEST`: inflate the request and submit it through the chaining policy
//! - `LND_RPC_RESPONSE`: hand the reply bytes to the gateway
//! - anything else goes to the dead-letter counter

use crate::domain::chaining::ChainingPolicy;
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::rpc::{RequestValue, RpcRequest};
use crate::gateway::{
    expiry_task, CorrelationGateway, PendingCall, ResponseDisposition, ResponseListener,
    REPLY_OPERATION, REPLY_SERVICE,
};
use crate::ports::outbound::{InboundSource, Transport};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

pub const SERVICE_NAME: &str = REPLY_SERVICE;

/// Operations understood by [`LightningService::handle_document`].
pub mod operations {
    pub const RPC_REQUEST: &str = "LND_RPC_REQUEST";
    pub const RPC_RESPONSE: &str = super::REPLY_OPERATION;
    /// Declared by the host protocol; not routed.
    pub const USE_REQUEST: &str = "USE_REQUEST";
}

/// Unit of work delivered to the service.
#[derive(Debug, Clone)]
pub struct Document {
    pub operation: String,
    /// Set on replies
    pub correlation_id: Option<CorrelationId>,
    /// Request in any accepted form; `content` is read as JSON when absent
    pub request: Option<RequestValue>,
    pub content: Bytes,
}

impl Document {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            correlation_id: None,
            request: None,
            content: Bytes::new(),
        }
    }

    pub fn rpc_request(request: impl Into<RequestValue>) -> Self {
        Self {
            request: Some(request.into()),
            ..Self::new(operations::RPC_REQUEST)
        }
    }

    pub fn rpc_response(correlation_id: CorrelationId, content: impl Into<Bytes>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            content: content.into(),
            ..Self::new(operations::RPC_RESPONSE)
        }
    }

    fn take_request(&mut self) -> GatewayResult<RpcRequest> {
        let value = match self.request.take() {
            Some(value) => value,
            None => {
                let json = std::str::from_utf8(&self.content)
                    .map_err(|e| GatewayError::InvalidRequest(format!("content is not UTF-8: {e}")))?;
                RequestValue::Json(json.to_string())
            }
        };
        RpcRequest::inflate(value)
    }
}

/// What the service did with a document.
#[derive(Debug)]
pub enum Handled {
    Submitted(PendingCall),
    Response(ResponseDisposition),
    DeadLettered(String),
}

pub struct LightningService {
    config: GatewayConfig,
    gateway: Arc<CorrelationGateway>,
    dead_letters: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LightningService {
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        policy: ChainingPolicy,
    ) -> Result<Self, ConfigError> {
        let gateway = CorrelationGateway::new(&config, transport)?.with_policy(policy);
        Ok(Self::with_gateway(config, gateway))
    }

    pub fn with_gateway(config: GatewayConfig, gateway: CorrelationGateway) -> Self {
        Self {
            config,
            gateway: Arc::new(gateway),
            dead_letters: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn gateway(&self) -> &Arc<CorrelationGateway> {
        &self.gateway
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn dead_letters(&self) -> u64 {
        self.dead_letters.load(Ordering::Relaxed)
    }

    /// Spawn the response listener and the expiry sweeper.
    pub fn start(&self, inbound: Arc<dyn InboundSource>) {
        info!(
            service = SERVICE_NAME,
            environment = %self.config.node.environment,
            port = self.config.node.port(),
            directory = %self.config.node.directory.display(),
            "Starting Lightning service"
        );
        let listener = ResponseListener::new(Arc::clone(&self.gateway), inbound);
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(listener.run()));
        tasks.push(tokio::spawn(expiry_task(
            Arc::clone(&self.gateway),
            self.config.timeouts.sweep_interval,
        )));
    }

    /// Stop background tasks and fail everything still pending.
    pub fn shutdown(&self) -> usize {
        let drained = self.gateway.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(service = SERVICE_NAME, drained = drained, "Lightning service stopped");
        drained
    }

    pub async fn handle_document(&self, document: Document) -> GatewayResult<Handled> {
        let span = ra_lnd_telemetry::call_span!("handle_document", operation = %document.operation);
        self.route(document).instrument(span).await
    }

    async fn route(&self, mut document: Document) -> GatewayResult<Handled> {
        match document.operation.as_str() {
            operations::RPC_REQUEST => {
                let request = document.take_request()?;
                let pending = self.gateway.submit_chained(request, None).await?;
                Ok(Handled::Submitted(pending))
            }
            operations::RPC_RESPONSE => match document.correlation_id {
                Some(id) => Ok(Handled::Response(
                    self.gateway.on_response(id, &document.content).await,
                )),
                None => Ok(self.dead_letter(document.operation, "reply without correlation id")),
            },
            _ => Ok(self.dead_letter(document.operation, "unsupported operation")),
        }
    }

    fn dead_letter(&self, operation: String, reason: &str) -> Handled {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
        warn!(operation = %operation, reason = reason, "Dead-lettered document");
        Handled::DeadLettered(operation)
    }
}
