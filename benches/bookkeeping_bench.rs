use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use strategy_keep::{LeakChecker, OrderRegistry, OrderStatus, SubmitResponse};

fn benchmark_on_submit(c: &mut Criterion) {
    c.bench_function("order_registry_on_submit", |b| {
        let registry = OrderRegistry::new();
        let mut seq: u64 = 0;
        b.iter(|| {
            seq += 1;
            let ack = SubmitResponse::new(seq.to_string(), OrderStatus::New);
            registry.on_submit(black_box("binance"), ack, json!({ "leg": 1 }))
        })
    });
}

fn benchmark_resubmit(c: &mut Criterion) {
    c.bench_function("order_registry_resubmit_same_key", |b| {
        let registry = OrderRegistry::new();
        b.iter(|| {
            let ack = SubmitResponse::new("42", OrderStatus::New);
            registry.on_submit(black_box("kraken"), ack, json!(null))
        })
    });
}

fn benchmark_leak_counters(c: &mut Criterion) {
    c.bench_function("leak_checker_push_pop", |b| {
        let checker = LeakChecker::default();
        b.iter(|| {
            checker.push(black_box("socket"));
            checker.pop(black_box("socket"));
        })
    });

    c.bench_function("leak_checker_guard", |b| {
        let checker = Arc::new(LeakChecker::default());
        b.iter(|| {
            let guard = checker.track(black_box("feed"));
            drop(guard);
        })
    });
}

criterion_group!(
    benches,
    benchmark_on_submit,
    benchmark_resubmit,
    benchmark_leak_counters
);
criterion_main!(benches);
