//! Buffer benchmark: measure both backends over the same workloads.
//!
//! Target: rope random access and edits stay O(log n) while the linear
//! oracle degrades linearly, and rope builds stay allocation-lean.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cordage::{Buffer, LinearBuffer, RopeBuffer};

fn sample_text(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes + 4);
    for ch in "hello world 左司馬販 ".chars().cycle() {
        if out.len() >= bytes {
            break;
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    }
    out
}

fn rope_build(c: &mut Criterion) {
    let text = sample_text(256 * 1024);
    let mut group = c.benchmark_group("rope_build_256k");
    for capacity in [64usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            b.iter(|| RopeBuffer::new(black_box(&text), capacity).unwrap());
        });
    }
    group.finish();
}

fn rune_at_random(c: &mut Criterion) {
    let text = sample_text(64 * 1024);
    let rope = RopeBuffer::new(&text, 256).unwrap();
    let linear = LinearBuffer::new(&text).unwrap();
    let len = rope.length();

    c.bench_function("rope_rune_at_64k", |b| {
        let mut pos = 0;
        b.iter(|| {
            pos = (pos + 4099) % len;
            rope.rune_at(black_box(pos)).unwrap()
        });
    });
    c.bench_function("linear_rune_at_64k", |b| {
        let mut pos = 0;
        b.iter(|| {
            pos = (pos + 4099) % len;
            linear.rune_at(black_box(pos)).unwrap()
        });
    });
}

fn persistent_insert(c: &mut Criterion) {
    let text = sample_text(64 * 1024);
    let rope = RopeBuffer::new(&text, 256).unwrap();
    let linear = LinearBuffer::new(&text).unwrap();
    let mid = rope.length() / 2;

    c.bench_function("rope_insert_mid_64k", |b| {
        b.iter(|| rope.insert(black_box(mid), "xyz").unwrap());
    });
    c.bench_function("linear_insert_mid_64k", |b| {
        b.iter(|| linear.insert(black_box(mid), "xyz").unwrap());
    });
}

fn in_place_insert(c: &mut Criterion) {
    c.bench_function("rope_insert_in_append", |b| {
        let mut rope = RopeBuffer::new(&sample_text(1024), 256).unwrap();
        b.iter(|| {
            let end = rope.length();
            rope.insert_in(end, "x").unwrap();
        });
    });
}

fn value_image(c: &mut Criterion) {
    let text = sample_text(256 * 1024);
    let rope = RopeBuffer::new(&text, 256).unwrap();
    c.bench_function("rope_value_256k", |b| {
        b.iter(|| black_box(rope.bytes()));
    });
}

fn stream_forward(c: &mut Criterion) {
    let text = sample_text(16 * 1024);
    let rope = RopeBuffer::new(&text, 256).unwrap();
    c.bench_function("rope_stream_16k", |b| {
        b.iter(|| {
            let mut stream = rope.stream_from(0);
            let mut total = 0usize;
            while let Some((_, size)) = stream.read_rune() {
                total += size;
            }
            total
        });
    });
}

criterion_group!(
    benches,
    rope_build,
    rune_at_random,
    persistent_insert,
    in_place_insert,
    value_image,
    stream_forward
);
criterion_main!(benches);
