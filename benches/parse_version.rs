use std::str::from_utf8;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orbitd::Version;

const VERSIONS: [&[u8]; 2] = [b"HTTP/1.0", b"HTTP/1.1"];

fn benchmark(c: &mut Criterion) {
    for version in VERSIONS {
        c.bench_with_input(
            BenchmarkId::new("version", from_utf8(version).unwrap()),
            black_box(&version),
            |b, i| b.iter(|| Version::parse(i)),
        );
    }
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
