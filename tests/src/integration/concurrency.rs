//! # Concurrent Entry Surfaces
//!
//! Dispatch, replies, deadlines and cancellation hit the same table from
//! different tasks. These tests run them on a multi-threaded runtime.

#[cfg(test)]
mod tests {
    use super::super::Node;
    use futures::future::join_all;
    use ra_lnd_gateway::{
        CallError, ChainingPolicy, CorrelationId, GatewayError, ResponseDisposition, RpcRequest,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_ids_are_unique() {
        let node = Node::new(512, ChainingPolicy::empty());
        let submissions = (0..256).map(|i| {
            let gateway = Arc::clone(&node.gateway);
            tokio::spawn(async move {
                gateway
                    .submit(RpcRequest::new("getblockhash", "/").with_param("height", i))
                    .await
                    .unwrap()
            })
        });
        let pending: Vec<_> = join_all(submissions)
            .await
            .into_iter()
            .map(|handle| handle.unwrap())
            .collect();

        let ids: HashSet<CorrelationId> = pending.iter().map(|p| p.id()).collect();
        assert_eq!(ids.len(), 256);
        assert_eq!(node.gateway.table().client_count(), 256);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ceiling_holds_under_concurrent_dispatch() {
        let node = Node::new(8, ChainingPolicy::empty());
        let attempts = (0..64).map(|_| {
            let gateway = Arc::clone(&node.gateway);
            tokio::spawn(async move { gateway.submit(RpcRequest::new("getbalance", "/")).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|handle| handle.unwrap())
            .collect();

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(GatewayError::BackpressureRejected { limit: 8 })))
            .count();
        assert_eq!(admitted, 8);
        assert_eq!(rejected, 56);
        assert_eq!(node.gateway.table().len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reply_timeout_and_cancel_race_settles_once() {
        let node = Node::new(256, ChainingPolicy::empty());
        for _ in 0..100 {
            let pending = node
                .gateway
                .submit(RpcRequest::new("getbalance", "/"))
                .await
                .unwrap();
            let id = pending.id();

            let reply = {
                let gateway = Arc::clone(&node.gateway);
                tokio::spawn(async move { gateway.on_response(id, br#"{"result":1}"#).await })
            };
            let timeout = {
                let gateway = Arc::clone(&node.gateway);
                tokio::spawn(async move { gateway.on_timeout(id) })
            };
            let cancel = {
                let gateway = Arc::clone(&node.gateway);
                tokio::spawn(async move { gateway.cancel(id) })
            };

            let replied = reply.await.unwrap() == ResponseDisposition::Delivered;
            let timed_out = timeout.await.unwrap();
            let cancelled = cancel.await.unwrap();
            let winners = [replied, timed_out, cancelled].iter().filter(|w| **w).count();
            assert_eq!(winners, 1);

            match pending.wait().await {
                Ok(_) => assert!(replied),
                Err(CallError::TimedOut { .. }) => assert!(timed_out),
                Err(CallError::Cancelled) => assert!(cancelled),
                Err(other) => panic!("unexpected outcome {other}"),
            }
        }
        assert!(node.gateway.table().is_empty());
        assert!(node.gateway.table().try_reserve().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_races_replies() {
        let node = Node::new(256, ChainingPolicy::empty());
        let mut pending = Vec::new();
        for _ in 0..64 {
            pending.push(node.gateway.submit(RpcRequest::new("uptime", "/")).await.unwrap());
        }
        let ids: Vec<_> = pending.iter().map(|p| p.id()).collect();

        let replier = {
            let gateway = Arc::clone(&node.gateway);
            tokio::spawn(async move {
                for id in ids {
                    gateway.on_response(id, br#"{"result":5}"#).await;
                }
            })
        };
        let drained = node.gateway.shutdown();
        replier.await.unwrap();

        let outcomes = join_all(pending.into_iter().map(|p| p.wait())).await;
        let closed = outcomes
            .iter()
            .filter(|o| matches!(o, Err(CallError::Closed)))
            .count();
        let delivered = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(closed, drained);
        assert_eq!(closed + delivered, 64);
        assert!(node.gateway.table().is_empty());
    }
}
