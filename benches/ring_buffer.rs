//! Receive-path benchmarks.
//!
//! - `ring_buffer/*`: write/read cycles at typical LLCP payload sizes,
//!   including the wrap-around copy and growth from an undersized buffer
//! - `socket_list/*`: the uncontended own + post + release cycle every
//!   lower-stack callback pays
//!
//! Run: `cargo bench --bench ring_buffer`

#![allow(missing_docs)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nfc_llcp_core::{RingBuffer, SocketList, WaitEvents};
use std::hint::black_box;

const PAYLOAD_SIZES: [usize; 3] = [128, 248, 2048];

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer/write_read");
    for size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut ring = RingBuffer::new();
            assert!(ring.allocate(size * 4));
            let payload = vec![0x5a; size];
            let mut out = vec![0; size];
            b.iter(|| {
                ring.write(black_box(&payload));
                ring.read(black_box(&mut out));
            });
        });
    }
    group.finish();
}

fn bench_wrapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer/wrapping");
    let size = 248;
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("odd_offsets", |b| {
        let mut ring = RingBuffer::new();
        assert!(ring.allocate(size * 2 + 7));
        let payload = vec![0xa5; size];
        let mut out = vec![0; size];
        b.iter(|| {
            ring.write(&payload);
            ring.read_available(black_box(&mut out[..size - 3]));
            ring.read_available(black_box(&mut out));
        });
    });
    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer/growth");
    for chunks in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(chunks), &chunks, |b, &chunks| {
            let payload = vec![1u8; 128];
            b.iter_batched(
                || {
                    let mut ring = RingBuffer::new();
                    assert!(ring.allocate(128));
                    ring
                },
                |mut ring| {
                    for _ in 0..chunks {
                        ring.write(&payload);
                    }
                    black_box(ring.data_available())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_event_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("socket_list");
    group.bench_function("own_post_release", |b| {
        let list = SocketList::new();
        let id = list.lock().add(0u32);
        b.iter(|| {
            let mut guard = list.lock();
            if let Some(mut node) = guard.own(black_box(id)) {
                node.post(WaitEvents::READ);
                node.clear(WaitEvents::READ);
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_write_read,
    bench_wrapping,
    bench_growth,
    bench_event_cycle
);
criterion_main!(benches);
