//! Gateway integration tests.
//!
//! Every test drives a real [`CorrelationGateway`] over the channel
//! transport; the test plays the node by reading envelopes and pushing
//! replies back.

pub mod concurrency;
pub mod flows;
pub mod properties;

use ra_lnd_gateway::adapters::channel::transport_channel;
use ra_lnd_gateway::ports::outbound::ManualTimeSource;
use ra_lnd_gateway::{ChainingPolicy, CorrelationGateway, Envelope, GatewayConfig, RpcRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A gateway wired to an in-memory node.
pub struct Node {
    pub gateway: Arc<CorrelationGateway>,
    pub outbound: mpsc::Receiver<Envelope>,
    pub clock: Arc<ManualTimeSource>,
}

impl Node {
    pub fn new(max_in_flight: usize, policy: ChainingPolicy) -> Self {
        let mut config = GatewayConfig::default();
        config.limits.max_in_flight = max_in_flight;
        config.timeouts.default = Duration::from_secs(30);
        let (transport, outbound) = transport_channel(max_in_flight.max(1) * 2);
        let clock = Arc::new(ManualTimeSource::new());
        let gateway = CorrelationGateway::new(&config, Arc::new(transport))
            .expect("default config is valid")
            .with_policy(policy)
            .with_time_source(clock.clone());
        Self {
            gateway: Arc::new(gateway),
            outbound,
            clock,
        }
    }

    /// Next envelope the node received, decoded back into a request.
    pub async fn next_request(&mut self) -> (Envelope, RpcRequest) {
        let envelope = self.outbound.recv().await.expect("gateway dropped");
        let body = std::str::from_utf8(&envelope.body).expect("utf-8 body");
        let request = RpcRequest::from_json(body).expect("request body");
        (envelope, request)
    }
}
