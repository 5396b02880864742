//! HTTP transport for the node's JSON-RPC listener.
//!
//! Each envelope is POSTed on its own task. Whatever body comes back is fed
//! to the reply queue under the envelope's correlation id. When no body can
//! be obtained a JSON-RPC error body is synthesized instead, so the caller
//! sees a remote error rather than waiting out the deadline.

use crate::adapters::channel::{inbound_channel, ChannelInbound};
use crate::domain::error::codes;
use crate::domain::rpc::{RpcErrorObject, RpcResponse};
use crate::ports::outbound::{Action, Envelope, InboundMessage, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    replies: mpsc::Sender<InboundMessage>,
}

impl HttpTransport {
    /// `timeout` bounds each HTTP exchange; the call deadline is enforced separately.
    pub fn new(timeout: Duration, replies: mpsc::Sender<InboundMessage>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::client_version())
            .build()
            .map_err(|e| TransportError::Rejected(format!("http client: {e}")))?;
        Ok(Self { client, replies })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, envelope: Envelope) -> Result<(), TransportError> {
        match envelope.url.scheme() {
            "http" | "https" => {}
            other => return Err(TransportError::UnsupportedTarget(format!("scheme {other}"))),
        }
        if self.replies.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut request = match envelope.action {
            Action::Post => self.client.post(envelope.url.clone()),
        };
        for (name, value) in &envelope.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request.body(envelope.body);

        let id = envelope.correlation_id;
        let url = envelope.url;
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let body = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.bytes().await {
                        Ok(body) => reply_body(body, status, &url),
                        Err(e) => failure_body(format!("reading reply from {url}: {e}"), status),
                    }
                }
                Err(e) => {
                    warn!(correlation_id = %id, url = %url, error = %e, "HTTP request failed");
                    failure_body(format!("request to {url} failed: {e}"), StatusCode::BAD_GATEWAY)
                }
            };
            debug!(correlation_id = %id, bytes = body.len(), "HTTP reply received");
            if replies.send(InboundMessage::new(id, body)).await.is_err() {
                debug!(correlation_id = %id, "Reply queue closed, dropping HTTP reply");
            }
        });
        Ok(())
    }
}

/// Body to hand back for an HTTP reply. Empty bodies, and error statuses
/// without a JSON object body (an HTML error page), become a failure body.
fn reply_body(body: Bytes, status: StatusCode, url: &Url) -> Bytes {
    if body.is_empty() {
        return failure_body(format!("empty reply from {url} ({status})"), status);
    }
    if !status.is_success() && !is_json_object(&body) {
        return failure_body(format!("{status} from {url}"), status);
    }
    body
}

fn is_json_object(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body).is_ok_and(|value| value.is_object())
}

fn failure_body(message: String, status: StatusCode) -> Bytes {
    let mut error = RpcErrorObject::new(codes::INTERNAL_ERROR, message);
    error.data = Some(serde_json::json!({ "status": status.as_u16() }));
    RpcResponse::failure(error)
        .encode()
        .map(Bytes::from)
        .unwrap_or_default()
}

/// HTTP transport plus the inbound source its replies arrive on.
pub fn http_transport(
    timeout: Duration,
    buffer: usize,
) -> Result<(HttpTransport, ChannelInbound), TransportError> {
    let (tx, inbound) = inbound_channel(buffer);
    Ok((HttpTransport::new(timeout, tx)?, inbound))
}
