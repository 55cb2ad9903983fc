use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modbus_poller::bytes::bytes_to_regs;
use modbus_poller::register_map::parse_register_map;
use modbus_poller::{decode, Encoding};

fn bench_numeric(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_numeric");
    let cases = [
        (Encoding::U16, vec![0x1234u16]),
        (Encoding::S32, vec![0xFFFF, 0xFF38]),
        (Encoding::U64, vec![0x0001, 0x0203, 0x0405, 0x0607]),
        (Encoding::GuessSigned, vec![0x8000, 0x0000]),
    ];

    for (encoding, regs) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(&encoding), &regs, |b, regs| {
            b.iter(|| {
                decode(
                    black_box(regs),
                    black_box(&encoding),
                    regs.len() as u16,
                    black_box(0.1),
                )
            })
        });
    }
    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let regs = bytes_to_regs(b"INVERTER-SN-0042\0\0\0\0");
    c.bench_function("decode_char_10_regs", |b| {
        b.iter(|| decode(black_box(&regs), &Encoding::Char, regs.len() as u16, 1.0))
    });
}

fn bench_truncated(c: &mut Criterion) {
    c.bench_function("decode_truncated", |b| {
        b.iter(|| decode(black_box(&[0x4142u16][..]), &Encoding::U64, 4, 1.0))
    });
}

fn bench_register_map(c: &mut Criterion) {
    let text: String = (0..200)
        .map(|i| format!("{},{},2,0.01,S32\n", 3 + i % 2, i * 2))
        .collect();
    c.bench_function("parse_register_map_200_rows", |b| {
        b.iter(|| parse_register_map(black_box(&text)))
    });
}

criterion_group!(
    benches,
    bench_numeric,
    bench_text,
    bench_truncated,
    bench_register_map
);
criterion_main!(benches);
