//! Trace parsing and hex codec benchmarks.
//!
//! Measures the per-cycle CPU work outside the engine subprocess.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rabbit_relay::codec::{decode_hex, encode_hex, tokens_from_compact};
use rabbit_relay::sensor::SyntheticGenerator;
use rabbit_relay::trace::parse_trace;

fn synthetic_trace(steps: usize) -> String {
    let mut text = String::from("Rabbit cipher trace\n\n");
    for step in 1..=steps {
        text.push_str(&format!("Step {}: Next-state function\n", step));
        text.push_str("Before counter update: c[0]=0x55447766\n");
        for i in 0..8 {
            text.push_str(&format!("x[{}] = 0x{:08X}, state word\n", i, step * 31 + i));
            text.push_str(&format!("c[{}] = 0x{:08X}\n", i, step * 17 + i));
            text.push_str(&format!("**temp[{}]** = 0x{:08X}\n", i, step * 7 + i));
        }
        text.push_str("carry = 1\n");
        text.push_str("Output block 0 = 9A 88 7F 01 22 33 44 55\n");
        text.push_str("After counter update: c[0]=0xA2177C9B\n");
    }
    text
}

fn bench_parse_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_trace");

    for steps in [4usize, 16, 64] {
        let text = synthetic_trace(steps);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &text, |b, text| {
            b.iter(|| black_box(parse_trace(black_box(text))))
        });
    }

    group.finish();
}

fn bench_hex_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("hex_codec");

    let payload = SyntheticGenerator::seeded(1).sample().to_json();
    let tokens = encode_hex(payload.as_bytes());
    let compact = hex::encode(payload.as_bytes());

    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| black_box(encode_hex(black_box(payload.as_bytes()))))
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(decode_hex(black_box(&tokens)).unwrap()))
    });
    group.bench_function("from_compact", |b| {
        b.iter(|| black_box(tokens_from_compact(black_box(&compact)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_parse_trace, bench_hex_codec);
criterion_main!(benches);
