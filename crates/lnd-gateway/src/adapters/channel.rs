//! In-memory transport over `tokio::sync::mpsc`.

use crate::ports::outbound::{Envelope, InboundMessage, InboundSource, Transport, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;

/// Hands envelopes to whoever holds the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Envelope>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn submit(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Rejected("outbound queue full".into()),
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Reads replies pushed by the host.
#[derive(Debug)]
pub struct ChannelInbound {
    receiver: Mutex<mpsc::Receiver<InboundMessage>>,
}

impl ChannelInbound {
    pub fn new(receiver: mpsc::Receiver<InboundMessage>) -> Self {
        Self {
            receiver: Mutex::new(receiver),
        }
    }
}

#[async_trait]
impl InboundSource for ChannelInbound {
    async fn receive(&self) -> Result<InboundMessage, TransportError> {
        let mut guard = self.receiver.lock().await;
        guard.recv().await.ok_or(TransportError::Closed)
    }
}

/// Create a transport plus the queue its envelopes land in.
pub fn transport_channel(buffer: usize) -> (ChannelTransport, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelTransport::new(tx), rx)
}

/// Create an inbound source plus the sender replies are pushed into.
pub fn inbound_channel(buffer: usize) -> (mpsc::Sender<InboundMessage>, ChannelInbound) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ChannelInbound::new(rx))
}
