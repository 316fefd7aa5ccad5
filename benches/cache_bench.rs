/*!
 * Benchmarks for the two-tier translation cache.
 *
 * Every dialogue line probes the cache before any backend call, so get
 * latency on hits and misses both matter.
 */

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use subtran::cache::TranslationCache;

fn populated_cache(entries: usize) -> TranslationCache {
    let cache = TranslationCache::with_capacity(entries * 2 + 16);
    for i in 0..entries {
        cache.set(
            &format!("Source line number {} with content", i),
            &format!("Linha de origem número {} com conteúdo", i),
            "en",
            "pt-BR",
            "bench",
            "",
            "",
        );
    }
    cache
}

fn bench_cache_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get_hit");
    for size in [100usize, 1000] {
        let cache = populated_cache(size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &cache, |b, cache| {
            let mut i = 0usize;
            b.iter(|| {
                let text = format!("Source line number {} with content", i % size);
                i += 1;
                black_box(cache.get(&text, "en", "pt-BR", "", ""))
            });
        });
    }
    group.finish();
}

fn bench_cache_misses(c: &mut Criterion) {
    let cache = populated_cache(1000);

    c.bench_function("cache_get_miss", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let text = format!("Never stored line {}", i);
            i += 1;
            black_box(cache.get(&text, "en", "pt-BR", "", ""))
        });
    });
}

fn bench_cache_set(c: &mut Criterion) {
    c.bench_function("cache_set", |b| {
        let cache = TranslationCache::with_capacity(100_000);
        let mut i = 0usize;
        b.iter(|| {
            let text = format!("Fresh line number {}", i);
            let translated = format!("Linha nova número {}", i);
            i += 1;
            cache.set(&text, &translated, "en", "pt-BR", "bench", "", "");
        });
    });
}

criterion_group!(benches, bench_cache_hits, bench_cache_misses, bench_cache_set);
criterion_main!(benches);
