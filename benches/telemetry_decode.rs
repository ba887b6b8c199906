//! Benchmarks for telemetry datagram decoding
//!
//! Tests parsing performance for:
//! - A full state datagram as the drone sends it
//! - Datagrams with malformed values that are skipped
//! - Accessor lookups on a decoded frame
//!
//! Platform: Cross-platform (synthetic datagrams, CI-safe)

use criterion::{Criterion, criterion_group, criterion_main};
use goose_link::TelemetryFrame;
use goose_link::test_utils::sample_telemetry;
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("telemetry_decode");

    group.bench_function("full_state", |b| {
        b.iter(|| black_box(TelemetryFrame::decode(black_box(sample_telemetry()))))
    });

    let malformed = b"pitch:abc;roll:;:5;yaw;bat:NaN;h:inf;tof:10;\r\n";
    group.bench_function("malformed", |b| {
        b.iter(|| black_box(TelemetryFrame::decode(black_box(malformed))))
    });

    group.finish();
}

fn bench_accessors(c: &mut Criterion) {
    let frame = TelemetryFrame::decode(sample_telemetry());

    c.bench_function("attitude_lookup", |b| {
        b.iter(|| {
            let frame = black_box(&frame);
            black_box((frame.pitch(), frame.roll(), frame.yaw(), frame.battery()))
        })
    });
}

criterion_group!(benches, bench_decode, bench_accessors);
criterion_main!(benches);
