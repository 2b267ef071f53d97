#![allow(unused_crate_dependencies)]
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use syncbin::{IntFormat, Options, Reader, Writer};

fn bench_write_sync(c: &mut Criterion) {
    fn bench(c: &mut Criterion, name: &str, values: &[u64]) {
        let opts = Options::default();
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut writer = Writer::from_writer(Vec::with_capacity(values.len() * 8));
                for &value in values {
                    writer.write_int(&opts, black_box(value)).expect("write must work");
                }
                writer.into_writer()
            })
        });
    }

    bench(c, "write_sync_small", &create_values::<256>(0x3F));
    bench(c, "write_sync_large", &create_values::<256>(u64::MAX));
}

fn bench_read_sync(c: &mut Criterion) {
    fn bench(c: &mut Criterion, name: &str, values: &[u64]) {
        let opts = Options::default();
        let buf = encode(&opts, values);

        c.bench_function(name, |b| {
            b.iter(|| {
                let mut reader = Reader::from_slice(black_box(&buf));
                let mut sum = 0u64;
                for _ in 0..values.len() {
                    sum = sum.wrapping_add(reader.read_int(&opts).expect("read must work"));
                }
                sum
            })
        });
    }

    bench(c, "read_sync_small", &create_values::<256>(0x3F));
    bench(c, "read_sync_large", &create_values::<256>(u64::MAX));
}

fn bench_write_leb128(c: &mut Criterion) {
    fn bench(c: &mut Criterion, name: &str, values: &[u64]) {
        let opts = Options { int_format: IntFormat::Leb128, ..Options::default() };
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut writer = Writer::from_writer(Vec::with_capacity(values.len() * 10));
                for &value in values {
                    writer.write_int(&opts, black_box(value)).expect("write must work");
                }
                writer.into_writer()
            })
        });
    }

    bench(c, "write_leb128_small", &create_values::<256>(0x3F));
    bench(c, "write_leb128_large", &create_values::<256>(u64::MAX));
}

fn bench_read_leb128(c: &mut Criterion) {
    fn bench(c: &mut Criterion, name: &str, values: &[u64]) {
        let opts = Options { int_format: IntFormat::Leb128, ..Options::default() };
        let buf = encode(&opts, values);

        c.bench_function(name, |b| {
            b.iter(|| {
                let mut reader = Reader::from_slice(black_box(&buf));
                let mut sum = 0u64;
                for _ in 0..values.len() {
                    sum = sum.wrapping_add(reader.read_int(&opts).expect("read must work"));
                }
                sum
            })
        });
    }

    bench(c, "read_leb128_small", &create_values::<256>(0x3F));
    bench(c, "read_leb128_large", &create_values::<256>(u64::MAX));
}

fn encode(opts: &Options, values: &[u64]) -> Vec<u8> {
    let mut writer = Writer::from_writer(Vec::new());
    for &value in values {
        writer.write_int(opts, value).expect("write must work");
    }
    writer.into_writer()
}

fn create_values<const LEN: usize>(mask: u64) -> [u64; LEN] {
    let mut buf = [0u64; LEN];
    let mut state = 0x9E37_79B9_7F4A_7C15u64;

    for value in &mut buf {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        *value = state & mask;
    }

    buf
}

criterion_group!(
    varint,
    bench_write_sync,
    bench_read_sync,
    bench_write_leb128,
    bench_read_leb128
);
criterion_main!(varint);
