//! Throughput Benchmark for Plexor
//!
//! Measures the parts of the control loop that do not wait on the network:
//! slot allocation and release, and readiness classification.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use plexor::client::{ClientTable, CloseReason};
use plexor::server::Dispatch;
use plexor::sys::Readiness;
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Accepted server-side streams plus the client ends keeping them open
fn accepted(count: usize) -> (Vec<(TcpStream, SocketAddr)>, Vec<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let clients = (0..count)
        .map(|_| TcpStream::connect(addr).unwrap())
        .collect();
    let streams = (0..count).map(|_| listener.accept().unwrap()).collect();
    (streams, clients)
}

/// Benchmark free-slot lookup on tables of different sizes
fn bench_find_free_slot(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_free_slot");
    group.throughput(Throughput::Elements(1));

    for capacity in [16usize, 1024, 65_536] {
        let table = ClientTable::new(capacity);
        group.bench_function(format!("empty_{}", capacity), |b| {
            b.iter(|| black_box(table.find_free_slot()));
        });
    }

    group.finish();
}

/// Benchmark activate/deactivate cycles on a table
fn bench_slot_cycle(c: &mut Criterion) {
    let (pool, _clients) = accepted(64);
    let mut table = ClientTable::new(256);

    let mut group = c.benchmark_group("slot_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("activate_deactivate", |b| {
        let mut i = 0usize;
        b.iter(|| {
            // The table closes what it is given, so hand it a duplicate.
            let (stream, addr) = &pool[i % pool.len()];
            let slot = table.find_free_slot().unwrap();
            table
                .activate(slot, stream.try_clone().unwrap(), *addr)
                .unwrap();
            table.deactivate(slot, CloseReason::Shutdown);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark readiness classification
fn bench_classify(c: &mut Criterion) {
    let inputs = [
        Readiness::WRITABLE,
        Readiness::READABLE | Readiness::WRITABLE,
        Readiness::HANGUP | Readiness::READABLE,
        Readiness::ERROR | Readiness::HANGUP | Readiness::READABLE,
        Readiness::INVALID,
        Readiness::EMPTY,
    ];

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(inputs.len() as u64));

    group.bench_function("classify", |b| {
        b.iter(|| {
            for readiness in inputs {
                black_box(Dispatch::classify(black_box(readiness)));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_find_free_slot, bench_slot_cycle, bench_classify);
criterion_main!(benches);
