use criterion::{black_box, criterion_group, criterion_main, Criterion};
use consult_core::cache::{fingerprint, AnalysisCache};

const CONTENT: &str = "Review the architecture of our billing service and   suggest \
                       where it can be split to reduce deployment risk";

fn benchmark_fingerprint(c: &mut Criterion) {
    c.bench_function("fingerprint", |b| b.iter(|| fingerprint(black_box(CONTENT))));
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let cache = AnalysisCache::with_capacity(1000);
    cache.store("architecture_review", CONTENT, "Split invoicing first.", 120, 0.8);

    c.bench_function("cache_lookup_hit", |b| {
        b.iter(|| cache.lookup(black_box("architecture_review"), black_box(CONTENT)))
    });
}

fn benchmark_store_with_eviction(c: &mut Criterion) {
    let cache = AnalysisCache::with_capacity(256);
    let mut counter = 0u64;

    c.bench_function("cache_store_at_capacity", |b| {
        b.iter(|| {
            counter += 1;
            cache.store(
                "cost_analysis",
                &format!("question {counter}"),
                "answer",
                10,
                (counter % 10) as f64 / 10.0,
            )
        })
    });
}

criterion_group!(
    benches,
    benchmark_fingerprint,
    benchmark_cache_hit,
    benchmark_store_with_eviction
);
criterion_main!(benches);
