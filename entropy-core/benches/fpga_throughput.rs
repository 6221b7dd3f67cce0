// SPDX-License-Identifier: MIT
//
// QRNG Entropy Engine: Multi-Technique Quantum Randomness Service
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/yourusername/qrng-entropy-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entropy_core::{debias::Debiaser, simulator::NoiseSimulator};

fn fpga_bytes(c: &mut Criterion) {
    let simulator = NoiseSimulator::deterministic(42);
    let debiaser = Debiaser::default();

    let mut group = c.benchmark_group("fpga");
    for size in [1_024usize, 65_536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("debiased_bytes", size), &size, |b, &size| {
            b.iter(|| {
                debiaser
                    .extract(black_box(size), |n| simulator.draw(n))
                    .map(|bytes| bytes.len())
            })
        });
    }
    group.finish();
}

fn raw_draw(c: &mut Criterion) {
    let simulator = NoiseSimulator::deterministic(7);
    let mut group = c.benchmark_group("simulator");
    group.throughput(Throughput::Bytes(8_192));
    group.bench_function("raw_65536_bits", |b| {
        b.iter(|| simulator.draw(black_box(65_536)).map(|s| s.bit_len))
    });
    group.finish();
}

criterion_group!(benches, fpga_bytes, raw_draw);
criterion_main!(benches);
