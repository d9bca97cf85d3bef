use criterion::{criterion_group, criterion_main, Criterion};
use ringcast::{FrameSlot, RingWriter};
use std::hint::black_box;

/// Steady-state publish with no readers attached: pure reuse path.
fn bench_step_reuse(c: &mut Criterion) {
    let mut writer = RingWriter::new(8, FrameSlot::<u64>::new).unwrap();
    c.bench_function("step_reuse", |b| {
        b.iter(|| {
            writer.current().fill(black_box(1));
            black_box(writer.step());
        });
    });
}

/// Publish with a reader chasing the writer one slot behind.
fn bench_step_with_chasing_reader(c: &mut Criterion) {
    let mut writer = RingWriter::new(8, FrameSlot::<u64>::new).unwrap();
    let mut reader = writer.subscribe();
    c.bench_function("step_chasing_reader", |b| {
        b.iter(|| {
            writer.current().fill(black_box(1));
            black_box(writer.step());
            black_box(reader.try_advance());
        });
    });
}

criterion_group!(benches, bench_step_reuse, bench_step_with_chasing_reader);
criterion_main!(benches);
