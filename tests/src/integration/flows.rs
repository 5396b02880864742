//! # Gateway Flows
//!
//! End-to-end scenarios through the public gateway surface:
//!
//! 1. **Request → reply**: one client entry, settled with the node's result
//! 2. **Remote error**: the node's error object reaches the caller unchanged
//! 3. **Chained call**: `loadwallet` runs first, then the visible call
//! 4. **Failed prerequisite**: the visible call is never sent
//! 5. **Deadline**: caller sees a timeout; a late reply is stale

#[cfg(test)]
mod tests {
    use super::super::Node;
    use bytes::Bytes;
    use ra_lnd_gateway::adapters::channel::inbound_channel;
    use ra_lnd_gateway::domain::error::codes;
    use ra_lnd_gateway::{
        CallError, ChainingPolicy, Document, Handled, InboundMessage, LightningService,
        ResponseDisposition, RpcRequest,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // CLIENT CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_get_balance_round_trip() {
        let mut node = Node::new(16, ChainingPolicy::empty());
        let pending = node
            .gateway
            .submit(RpcRequest::new("getBalance", "/balance"))
            .await
            .unwrap();

        let table = node.gateway.table();
        assert_eq!(table.client_count(), 1);
        assert_eq!(table.internal_count(), 0);

        let (envelope, request) = node.next_request().await;
        assert_eq!(envelope.correlation_id, pending.id());
        assert_eq!(request.method, "getBalance");
        assert!(request.params.is_empty());
        assert_eq!(envelope.url.path(), "/balance");

        let disposition = node
            .gateway
            .on_response(envelope.correlation_id, br#"{"result":{"balance":500000}}"#)
            .await;
        assert_eq!(disposition, ResponseDisposition::Delivered);
        assert_eq!(pending.wait().await.unwrap(), json!({"balance": 500000}));
        assert!(node.gateway.table().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let mut node = Node::new(16, ChainingPolicy::empty());
        let pending = node
            .gateway
            .submit(RpcRequest::new("getblockhash", "/").with_param("height", -1))
            .await
            .unwrap();
        let (envelope, _) = node.next_request().await;

        node.gateway
            .on_response(
                envelope.correlation_id,
                br#"{"result":null,"error":{"code":-8,"message":"Block height out of range"}}"#,
            )
            .await;

        match pending.wait().await {
            Err(CallError::Remote(error)) => {
                assert_eq!(error.code, -8);
                assert_eq!(error.message, "Block height out of range");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
        assert!(node.gateway.table().is_empty());
    }

    // =============================================================================
    // CHAINED CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_wallet_call_loads_wallet_first() {
        let mut node = Node::new(16, ChainingPolicy::wallet_defaults());
        let pending = node
            .gateway
            .submit_chained(RpcRequest::new("getwalletinfo", "/wallet/alice"), None)
            .await
            .unwrap();

        let (load, request) = node.next_request().await;
        assert_eq!(request.method, "loadwallet");
        assert_eq!(request.params["filename"], "alice");
        assert_eq!(node.gateway.table().internal_count(), 1);
        assert_eq!(node.gateway.table().client_count(), 0);

        node.gateway
            .on_response(load.correlation_id, br#"{"result":{"name":"alice","warning":""}}"#)
            .await;

        let (visible, request) = node.next_request().await;
        assert_eq!(request.method, "getwalletinfo");
        assert_eq!(envelope_path(&visible), "/wallet/alice");
        assert_eq!(node.gateway.table().internal_count(), 0);
        assert_eq!(node.gateway.table().client_count(), 1);

        node.gateway
            .on_response(visible.correlation_id, br#"{"result":{"walletname":"alice","txcount":3}}"#)
            .await;
        assert_eq!(pending.wait().await.unwrap()["txcount"], 3);
        assert!(node.gateway.table().is_empty());
    }

    fn envelope_path(envelope: &ra_lnd_gateway::Envelope) -> &str {
        envelope.url.path()
    }

    #[tokio::test]
    async fn test_failed_prerequisite_never_dispatches_visible_call() {
        let mut node = Node::new(16, ChainingPolicy::wallet_defaults());
        let pending = node
            .gateway
            .submit_chained(RpcRequest::new("getbalance", "/wallet/ghost"), None)
            .await
            .unwrap();
        let (load, _) = node.next_request().await;

        let disposition = node
            .gateway
            .on_response(
                load.correlation_id,
                br#"{"result":null,"error":{"code":-18,"message":"Wallet file not found"}}"#,
            )
            .await;
        assert_eq!(disposition, ResponseDisposition::Chained);

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, CallError::PrerequisiteFailed { ref method, .. } if method == "loadwallet"));
        assert_eq!(err.code(), codes::WALLET_NOT_FOUND);

        assert_eq!(node.gateway.table().internal_count(), 0);
        assert_eq!(node.gateway.table().client_count(), 0);
        assert!(node.outbound.try_recv().is_err(), "visible call must not be sent");
    }

    // =============================================================================
    // DEADLINES
    // =============================================================================

    #[tokio::test]
    async fn test_timeout_then_late_reply() {
        let mut node = Node::new(16, ChainingPolicy::empty());
        let pending = node
            .gateway
            .submit_with_timeout(RpcRequest::new("getbalance", "/"), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        let (envelope, _) = node.next_request().await;

        node.clock.advance(Duration::from_millis(2));
        assert_eq!(node.gateway.expire_overdue(), 1);
        assert_eq!(node.gateway.expire_overdue(), 0);

        let late = node
            .gateway
            .on_response(envelope.correlation_id, br#"{"result":1}"#)
            .await;
        assert_eq!(late, ResponseDisposition::Stale);

        match pending.wait().await {
            Err(CallError::TimedOut { method, after }) => {
                assert_eq!(method, "getbalance");
                assert_eq!(after, Duration::from_millis(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        let stats = node.gateway.table().stats();
        assert_eq!(ra_lnd_gateway::domain::PendingStats::get(&stats.total_timeouts), 1);
        assert_eq!(ra_lnd_gateway::domain::PendingStats::get(&stats.total_stale), 1);
    }

    #[tokio::test]
    async fn test_duplicate_reply_is_stale() {
        let mut node = Node::new(16, ChainingPolicy::empty());
        let pending = node.gateway.submit(RpcRequest::new("uptime", "/")).await.unwrap();
        let (envelope, _) = node.next_request().await;

        let first = node.gateway.on_response(envelope.correlation_id, br#"{"result":60}"#).await;
        let second = node.gateway.on_response(envelope.correlation_id, br#"{"result":61}"#).await;
        assert_eq!(first, ResponseDisposition::Delivered);
        assert_eq!(second, ResponseDisposition::Stale);
        assert_eq!(pending.wait().await.unwrap(), json!(60));
    }

    // =============================================================================
    // SERVICE
    // =============================================================================

    #[tokio::test]
    async fn test_service_routes_documents_through_listener() {
        let (transport, mut outbound) = ra_lnd_gateway::adapters::transport_channel(8);
        let service = LightningService::new(
            ra_lnd_gateway::GatewayConfig::default(),
            Arc::new(transport),
            ChainingPolicy::empty(),
        )
        .unwrap();
        let (replies, inbound) = inbound_channel(8);
        service.start(Arc::new(inbound));

        let handled = service
            .handle_document(Document::rpc_request(
                r#"{"method":"getnetworkinfo","params":{},"path":"/"}"#.to_string(),
            ))
            .await
            .unwrap();
        let Handled::Submitted(pending) = handled else {
            panic!("request was not submitted");
        };

        let envelope = outbound.recv().await.unwrap();
        replies
            .send(InboundMessage::new(
                envelope.correlation_id,
                Bytes::from_static(br#"{"result":{"version":270000}}"#),
            ))
            .await
            .unwrap();

        assert_eq!(pending.wait().await.unwrap()["version"], 270000);
        assert_eq!(service.shutdown(), 0);
    }
}
