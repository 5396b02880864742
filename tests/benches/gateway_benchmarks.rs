//! # Gateway Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Pending table reserve + insert + claim | < 1µs |
//! | Reply decode | < 5µs for a wallet-sized result |
//! | Dispatch + reply over the channel transport | < 20µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ra_lnd_gateway::adapters::transport_channel;
use ra_lnd_gateway::domain::pending::{Completion, PendingCallTable, PendingEntry, Responder};
use ra_lnd_gateway::{ChainingPolicy, CorrelationGateway, CorrelationId, GatewayConfig, RpcRequest, RpcResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

fn bench_pending_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending-table");
    let table = PendingCallTable::new(1024);
    let request = RpcRequest::new("getbalance", "/wallet/bench");

    group.bench_function("register_and_claim", |b| {
        b.iter(|| {
            let (tx, _rx) = oneshot::channel();
            let id = CorrelationId::new();
            let entry = PendingEntry::new(
                id,
                request.clone(),
                Completion::Client(Responder::new(tx)),
                Instant::now(),
                Duration::from_secs(30),
            );
            let reservation = table.try_reserve().unwrap();
            table.insert(reservation, entry).unwrap();
            black_box(table.claim(&id))
        })
    });

    for preload in [0usize, 100, 1000] {
        let table = PendingCallTable::new(preload + 1);
        let mut receivers = Vec::with_capacity(preload);
        for _ in 0..preload {
            let (tx, rx) = oneshot::channel();
            receivers.push(rx);
            let entry = PendingEntry::new(
                CorrelationId::new(),
                request.clone(),
                Completion::Client(Responder::new(tx)),
                Instant::now(),
                Duration::from_secs(30),
            );
            let reservation = table.try_reserve().unwrap();
            table.insert(reservation, entry).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("expired_scan", preload), &preload, |b, _| {
            b.iter(|| black_box(table.expired_ids(Instant::now())))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("rpc-decode");
    let utxos: Vec<_> = (0..50)
        .map(|i| json!({"txid": format!("{i:064x}"), "vout": i, "amount": 0.001, "confirmations": 6}))
        .collect();
    let body = RpcResponse::success(json!(utxos)).encode().unwrap();
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("listunspent_50", |b| {
        b.iter(|| black_box(RpcResponse::decode(&body).unwrap()))
    });
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (transport, mut outbound) = transport_channel(1024);
    let gateway = CorrelationGateway::new(&GatewayConfig::default(), Arc::new(transport))
        .unwrap()
        .with_policy(ChainingPolicy::empty());

    c.bench_function("dispatch_and_reply", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let pending = gateway
                    .submit(RpcRequest::new("getblockcount", "/"))
                    .await
                    .unwrap();
                let envelope = outbound.recv().await.unwrap();
                gateway
                    .on_response(envelope.correlation_id, br#"{"result":800000}"#)
                    .await;
                black_box(pending.wait().await.unwrap())
            })
        })
    });
}

criterion_group!(benches, bench_pending_table, bench_decode, bench_round_trip);
criterion_main!(benches);
