use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orbitd::throttle::Throttler;

fn benchmark(c: &mut Criterion) {
    c.bench_function("throttle_consume", |b| {
        let throttler = Throttler::new(1_000_000, Duration::from_secs(1));
        b.iter(|| throttler.consume(black_box(64)));
    });

    c.bench_function("throttle_current_quota", |b| {
        let throttler = Throttler::new(1_000_000, Duration::from_secs(1));
        b.iter(|| black_box(throttler.current_quota()));
    });

    c.bench_function("throttle_disabled_consume", |b| {
        let throttler = Throttler::disabled();
        b.iter(|| throttler.consume(black_box(64)));
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
