use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use docwire::columns::{Column, DType, Patch, Slice, patch_to_column, stream_to_column};
use serde_json::json;

const ROWS: usize = 100_000;

fn base(dtype: DType) -> Column {
    let values: Vec<f64> = (0..ROWS).map(|i| i as f64).collect();
    Column::typed(dtype, &values)
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");
    let incoming = Column::typed(DType::Float64, &[1.0; 1000]);
    group.throughput(Throughput::Elements(1000));

    // at capacity: shift in place
    group.bench_function("float64_rollover_full", |b| {
        b.iter_batched(
            || base(DType::Float64),
            |col| black_box(stream_to_column(col, incoming.clone(), Some(ROWS)).unwrap()),
            BatchSize::LargeInput,
        );
    });

    // no rollover: concatenate
    group.bench_function("float64_append", |b| {
        b.iter_batched(
            || base(DType::Float64),
            |col| black_box(stream_to_column(col, incoming.clone(), None).unwrap()),
            BatchSize::LargeInput,
        );
    });

    // growable sequence
    let values = Column::from_values((0..1000).map(|i| json!(i)));
    group.bench_function("sequence_rollover", |b| {
        b.iter_batched(
            || Column::from_values((0..10_000).map(|i| json!(i))),
            |col| black_box(stream_to_column(col, values.clone(), Some(10_000)).unwrap()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch");

    let scalars: Vec<Patch> = (0..1000)
        .map(|i| Patch::scalar(i * 97 % ROWS as i64, json!(-1.0)))
        .collect();
    group.throughput(Throughput::Elements(1000));
    group.bench_function("float64_1000_scalars", |b| {
        let mut col = base(DType::Float64);
        b.iter(|| black_box(patch_to_column(&mut col, &scalars).unwrap()));
    });

    let strided = [Patch::range(
        Slice::range(0, ROWS as i64).with_step(100),
        vec![json!(0); ROWS / 100],
    )];
    group.bench_function("int32_strided_slice", |b| {
        let mut col = base(DType::Int32);
        b.iter(|| black_box(patch_to_column(&mut col, &strided).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_stream, bench_patch);
criterion_main!(benches);
