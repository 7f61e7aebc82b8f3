//! Throughput benchmarks for the checksum implementations.
//!
//! Measures Adler-32 and CRC-32 across data sizes and patterns, plus
//! incremental vs. one-shot calculation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ferroflate_core::checksum::{Adler32, Crc32};
use std::hint::black_box;

/// Generate reproducible pseudo-random data with a simple LCG.
fn random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed: u64 = 0x123456789ABCDEF0;
    for _ in 0..size {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((seed >> 32) as u8);
    }
    data
}

fn bench_adler32(c: &mut Criterion) {
    let mut group = c.benchmark_group("adler32");
    for size in [1024, 64 * 1024, 1024 * 1024] {
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| Adler32::checksum(black_box(data)));
        });
    }
    group.finish();
}

fn bench_crc32(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");
    for size in [1024, 64 * 1024, 1024 * 1024] {
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| Crc32::compute(black_box(data)));
        });
    }
    group.finish();
}

fn bench_crc32_incremental(c: &mut Criterion) {
    let data = random_data(1024 * 1024);
    c.bench_function("crc32_incremental_4k_chunks", |b| {
        b.iter(|| {
            let mut crc = Crc32::new();
            for chunk in black_box(&data).chunks(4096) {
                crc.update(chunk);
            }
            crc.finalize()
        });
    });
}

criterion_group!(benches, bench_adler32, bench_crc32, bench_crc32_incremental);
criterion_main!(benches);
