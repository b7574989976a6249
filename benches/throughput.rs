//! Throughput Benchmark for LineKV
//!
//! Measures the store under common workloads and the cost of the full
//! parse-dispatch-serialize path for a single command line.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use linekv::protocol::LineParser;
use linekv::storage::Store;
use linekv::{CommandDispatcher, Shutdown};
use std::sync::Arc;
use std::time::Duration;

fn populated(n: usize) -> Arc<Store> {
    let store = Arc::new(Store::new());
    for i in 0..n {
        store.set(format!("key:{}", i), format!("value:{}", i));
    }
    store
}

fn bench_set(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(format!("key:{}", i), "small_value");
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = "x".repeat(1024);
        b.iter(|| {
            store.set(format!("key:{}", i), value.as_str());
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let store = populated(100_000);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// 80% reads, 20% writes
fn bench_mixed(c: &mut Criterion) {
    let store = populated(10_000);

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                store.set(format!("new:{}", i), "value");
            } else {
                black_box(store.get(&format!("key:{}", i % 10_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.set(key.as_str(), "value");
                            store.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

fn bench_expiry(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set_with_ttl(format!("ttl:{}", i), "value", Duration::from_secs(3600));
            i += 1;
        });
    });

    group.bench_function("ttl_lookup", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.ttl(&format!("ttl:{}", i % 1_000)));
            i += 1;
        });
    });

    group.bench_function("sweep_nothing_expired", |b| {
        b.iter(|| black_box(store.sweep_expired()));
    });

    group.finish();
}

fn bench_keys(c: &mut Criterion) {
    let store = populated(3_000);

    let mut group = c.benchmark_group("keys");
    group.bench_function("keys_sorted", |b| {
        b.iter(|| black_box(store.keys()));
    });
    group.finish();
}

/// Full path for one command line: frame, dispatch, serialize.
fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = CommandDispatcher::new(populated(10_000), Shutdown::new());
    let (client, _inbox) = dispatcher
        .registry()
        .register("127.0.0.1:1".parse().unwrap());
    let parser = LineParser::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    for (name, line) in [
        ("get", &b"GET key:42\n"[..]),
        ("set", &b"SET key:42 updated\n"[..]),
        ("mget", &b"MGET key:1 key:2 key:3 missing\n"[..]),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut buf = BytesMut::from(line);
                let tokens = parser.parse(&mut buf).unwrap().unwrap();
                let reply = runtime.block_on(dispatcher.dispatch(&tokens, &client));
                black_box(reply.serialize());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
    bench_keys,
    bench_dispatch,
);

criterion_main!(benches);
