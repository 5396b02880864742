//! # Settlement Properties
//!
//! Random schedules of replies, deadlines and cancellations over a batch of
//! calls. Whatever the order, each caller observes exactly one outcome and
//! the table ends empty.

#[cfg(test)]
mod tests {
    use super::super::Node;
    use proptest::prelude::*;
    use ra_lnd_gateway::{CallError, ChainingPolicy, RpcRequest, RpcResponse};
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Event {
        Reply(usize),
        ErrorReply(usize),
        Timeout(usize),
        Cancel(usize),
        Malformed(usize),
        Sweep(u64),
    }

    fn event(calls: usize) -> impl Strategy<Value = Event> {
        prop_oneof![
            (0..calls).prop_map(Event::Reply),
            (0..calls).prop_map(Event::ErrorReply),
            (0..calls).prop_map(Event::Timeout),
            (0..calls).prop_map(Event::Cancel),
            (0..calls).prop_map(Event::Malformed),
            (1u64..50).prop_map(Event::Sweep),
        ]
    }

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    enum Expected {
        #[default]
        Pending,
        Result,
        Remote,
        TimedOut,
        Cancelled,
    }

    fn run(deadlines_ms: Vec<u64>, events: Vec<Event>) -> Result<(), TestCaseError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let node = Node::new(64, ChainingPolicy::empty());
            let mut calls = Vec::new();
            for (i, ms) in deadlines_ms.iter().enumerate() {
                let request = RpcRequest::new("getblockhash", "/").with_param("height", i as u64);
                calls.push(
                    node.gateway
                        .submit_with_timeout(request, Some(Duration::from_millis(*ms)))
                        .await
                        .unwrap(),
                );
            }
            let ids: Vec<_> = calls.iter().map(|c| c.id()).collect();
            let mut expected = vec![Expected::Pending; ids.len()];
            let mut elapsed = 0u64;

            for event in events {
                match event {
                    Event::Reply(i) => {
                        node.gateway.on_response(ids[i], br#"{"result":7}"#).await;
                        if expected[i] == Expected::Pending {
                            expected[i] = Expected::Result;
                        }
                    }
                    Event::ErrorReply(i) => {
                        node.gateway
                            .on_response(ids[i], br#"{"error":{"code":-1,"message":"no"}}"#)
                            .await;
                        if expected[i] == Expected::Pending {
                            expected[i] = Expected::Remote;
                        }
                    }
                    Event::Timeout(i) => {
                        let claimed = node.gateway.on_timeout(ids[i]);
                        prop_assert_eq!(claimed, expected[i] == Expected::Pending);
                        if claimed {
                            expected[i] = Expected::TimedOut;
                        }
                    }
                    Event::Cancel(i) => {
                        let claimed = node.gateway.cancel(ids[i]);
                        prop_assert_eq!(claimed, expected[i] == Expected::Pending);
                        if claimed {
                            expected[i] = Expected::Cancelled;
                        }
                    }
                    Event::Malformed(i) => {
                        node.gateway.on_response(ids[i], b"{\"result\":").await;
                    }
                    Event::Sweep(ms) => {
                        node.clock.advance(Duration::from_millis(ms));
                        elapsed += ms;
                        node.gateway.expire_overdue();
                        for (i, deadline) in deadlines_ms.iter().enumerate() {
                            if expected[i] == Expected::Pending && elapsed > *deadline {
                                expected[i] = Expected::TimedOut;
                            }
                        }
                    }
                }
            }

            let still_pending = expected.iter().filter(|e| **e == Expected::Pending).count();
            prop_assert_eq!(node.gateway.table().len(), still_pending);
            node.gateway.shutdown();

            for (call, expected) in calls.into_iter().zip(expected) {
                let outcome = call.wait().await;
                let ok = match (expected, &outcome) {
                    (Expected::Result, Ok(value)) => *value == json!(7),
                    (Expected::Remote, Err(CallError::Remote(e))) => e.code == -1,
                    (Expected::TimedOut, Err(CallError::TimedOut { .. })) => true,
                    (Expected::Cancelled, Err(CallError::Cancelled)) => true,
                    (Expected::Pending, Err(CallError::Closed)) => true,
                    _ => false,
                };
                prop_assert!(ok, "expected {:?}, observed {:?}", expected, outcome);
            }
            prop_assert!(node.gateway.table().is_empty());
            Ok(())
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_each_call_settles_exactly_once(
            deadlines_ms in prop::collection::vec(1u64..100, 1..8),
            seed_events in prop::collection::vec(event(8), 0..40),
        ) {
            let calls = deadlines_ms.len();
            let events = seed_events
                .into_iter()
                .map(|e| match e {
                    Event::Reply(i) => Event::Reply(i % calls),
                    Event::ErrorReply(i) => Event::ErrorReply(i % calls),
                    Event::Timeout(i) => Event::Timeout(i % calls),
                    Event::Cancel(i) => Event::Cancel(i % calls),
                    Event::Malformed(i) => Event::Malformed(i % calls),
                    sweep => sweep,
                })
                .collect();
            run(deadlines_ms, events)?;
        }

        #[test]
        fn prop_response_survives_the_wire(
            result in prop_oneof![
                any::<i64>().prop_map(Value::from),
                "[a-z0-9]{0,12}".prop_map(Value::from),
                Just(json!({"balance": 500000})),
            ],
        ) {
            let encoded = RpcResponse::success(result.clone()).encode().unwrap();
            let decoded = RpcResponse::decode(&encoded).unwrap();
            prop_assert_eq!(decoded.into_result().unwrap(), result);
        }
    }
}
