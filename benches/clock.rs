//! Benchmarks for guest clock conversion.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gpuquery::{nanoseconds_to_ticks, GuestClock, StdHostClock};

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");

    group.bench_function("nanoseconds_to_ticks", |b| {
        b.iter(|| nanoseconds_to_ticks(black_box(123_456_789_012)))
    });

    let clock = GuestClock::new(Arc::new(StdHostClock::new()), false);
    group.bench_function("guest_ticks", |b| b.iter(|| black_box(clock.ticks())));

    let fast = GuestClock::new(Arc::new(StdHostClock::new()), true);
    group.bench_function("guest_timestamp_fast", |b| b.iter(|| black_box(fast.timestamp())));

    group.finish();
}

criterion_group!(benches, bench_conversion);
criterion_main!(benches);
