// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for field decoding and report rendering.
//!
//! Everything here runs on a simulated descriptor, so no GPU is needed.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gprobelib::backend::simulated::SimulatedDevice;
use gprobelib::decode::{format_iec, format_si, Prefix};
use gprobelib::device::{BenchmarkResults, DeviceSnapshot};
use gprobelib::report::{self, ReportMeta};
use gprobelib::Decoder;

fn snapshot() -> DeviceSnapshot {
    let device = SimulatedDevice::preset("Bench GPU", 8, 6).with_uniform_bandwidth(12.5e9);
    let mut results = BenchmarkResults {
        bandwidth: device.bandwidth,
        throughput: device.throughput,
        ..Default::default()
    };
    results.run = 1;
    DeviceSnapshot {
        index: 0,
        info: device.info,
        results,
    }
}

fn bench_unit_scaling(c: &mut Criterion) {
    c.bench_function("format_si", |b| {
        b.iter(|| format_si(black_box(29_770_000_000_000.0), Prefix::Nothing, "flop/s"));
    });
    c.bench_function("format_iec", |b| {
        b.iter(|| format_iec(black_box(6_000_000.0), Prefix::Nothing, "B/s"));
    });
}

fn bench_decode_fields(c: &mut Criterion) {
    let snapshot = snapshot();
    c.bench_function("decode_all_fields", |b| {
        b.iter(|| Decoder::from_snapshot(black_box(&snapshot)).fields());
    });
}

fn bench_reports(c: &mut Criterion) {
    let snapshot = snapshot();
    let meta = ReportMeta::current();
    c.bench_function("text_report", |b| {
        b.iter(|| report::text_report(black_box(&snapshot), &meta));
    });
    c.bench_function("html_report", |b| {
        b.iter(|| report::html_report(black_box(&snapshot), &meta));
    });
}

criterion_group!(benches, bench_unit_scaling, bench_decode_fields, bench_reports);
criterion_main!(benches);
