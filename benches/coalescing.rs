use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lookup_throttle::infrastructure::mocks::{MockItem, MockLookupService, RecordingSink};
use lookup_throttle::{
    GateDecision, LookupKey, MemoryStore, RateLimitGate, RequestCoalescer, SystemClock,
};
use std::sync::Arc;

fn gate() -> RateLimitGate {
    RateLimitGate::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock::new()),
        Arc::new(RecordingSink::new()),
    )
}

fn coalescer(known: LookupKey) -> Arc<RequestCoalescer<MockItem>> {
    let service = Arc::new(MockLookupService::with_items(
        (0..known).map(MockItem::new),
    ));
    RequestCoalescer::<MockItem>::builder(service, gate())
        .build()
        .unwrap()
}

/// Benchmark registration throughput with few and many distinct keys
fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");
    group.throughput(Throughput::Elements(1000));

    for distinct in [1, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("distinct_keys", distinct),
            distinct,
            |b, &distinct| {
                b.iter(|| {
                    let coalescer = coalescer(0);
                    for i in 0..1000 {
                        coalescer.enqueue(black_box(i % distinct), |_| {});
                    }
                    black_box(coalescer.pending_len())
                })
            },
        );
    }

    group.finish();
}

/// Benchmark concurrent registration from several threads
fn bench_concurrent_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_enqueue");

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let coalescer = coalescer(0);

                    let mut handles = vec![];
                    for t in 0..num_threads {
                        let coalescer = Arc::clone(&coalescer);
                        handles.push(std::thread::spawn(move || {
                            for i in 0..1000 {
                                coalescer.enqueue(black_box((t * 1000 + i) as LookupKey), |_| {});
                            }
                        }));
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark a full drain cycle: gate check, batch call and callback dispatch
fn bench_tick(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("tick");

    for keys in [10, 100].iter() {
        group.throughput(Throughput::Elements(*keys as u64));

        group.bench_with_input(BenchmarkId::new("keys", keys), keys, |b, &keys| {
            let coalescer = coalescer(keys);
            b.to_async(&rt).iter(|| {
                let coalescer = Arc::clone(&coalescer);
                async move {
                    for key in 0..keys {
                        coalescer.enqueue(key, |item| {
                            black_box(item);
                        });
                    }
                    black_box(coalescer.tick().await)
                }
            })
        });
    }

    group.finish();
}

/// Benchmark the gate check against the in-memory store
fn bench_gate_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = gate();

    c.bench_function("gate_check_unrestricted", |b| {
        b.to_async(&rt).iter(|| async {
            let decision = gate.check_and_maybe_unlock().await;
            assert_eq!(decision, GateDecision::ALLOW);
        })
    });
}

criterion_group!(
    benches,
    bench_enqueue,
    bench_concurrent_enqueue,
    bench_tick,
    bench_gate_check
);
criterion_main!(benches);
