use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tsdb_history::aggregation::aggregate;
use tsdb_history::cache::MemorySeriesCache;
use tsdb_history::query::BucketPlan;
use tsdb_history::{
    AggregateFunction, HistoryQuery, InMemorySampleSource, Sample, SeriesEngine, SeriesInfo,
    ValueFormat,
};

fn create_samples(count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| Sample::new(i as i64 * 1_000, 100.0 + (i % 97) as f64 * 0.5))
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for size in [1_000, 10_000, 100_000].iter() {
        let samples = create_samples(*size);
        let plan = BucketPlan {
            start: 0,
            end: *size as i64 * 1_000,
            width: 60_000,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(aggregate(samples.iter().copied(), plan).unwrap()));
        });
    }

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("history");

    for size in [10_000, 100_000].iter() {
        let source = Arc::new(InMemorySampleSource::new());
        source
            .create_series(SeriesInfo::new("bench").with_format(ValueFormat::Float))
            .unwrap();
        source.load("bench", create_samples(*size)).unwrap();

        let uncached = SeriesEngine::uncached(source.clone());
        let cached = SeriesEngine::new(source, Arc::new(MemorySeriesCache::default()));
        let query = HistoryQuery::new("bench")
            .num_buckets(200)
            .functions(AggregateFunction::ALL);

        group.bench_with_input(BenchmarkId::new("miss", size), size, |b, _| {
            b.iter(|| rt.block_on(async { black_box(uncached.history(&query).await.unwrap()) }));
        });

        rt.block_on(cached.history(&query)).unwrap();
        group.bench_with_input(BenchmarkId::new("hit", size), size, |b, _| {
            b.iter(|| rt.block_on(async { black_box(cached.history(&query).await.unwrap()) }));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_history);
criterion_main!(benches);
