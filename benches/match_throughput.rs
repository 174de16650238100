//! Match Throughput Benchmarks
//!
//! Run with: cargo bench --bench match_throughput
//!
//! Labels:
//! - Corpus size (small, medium, large)
//! - Presearcher passes (1, 2, 3)
//! - Batch size (1, 16, 256 documents)
//!
//! The interesting ratio is queries_run / corpus size: the fraction of the
//! corpus the presearcher lets through to exact matching.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use percolate::{
    DocumentBatch, InputDocument, Monitor, MonitorQuery, Presearcher, SimpleMatcher, StandardAnalyzer,
    StandardQueryParser,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Constants and Utilities
// ============================================================================

/// Fixed seed for reproducible benchmarks
const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

const WORDS: &[&str] = &[
    "agent", "batch", "cache", "delta", "event", "field", "graph", "index", "judge", "kernel", "lambda", "merge",
    "node", "order", "parse", "query", "range", "store", "token", "union", "value", "write", "yield", "zone",
];

/// Simple LCG for deterministic pseudo-random choices
fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn word(state: &mut u64) -> &'static str {
    WORDS[(lcg_next(state) >> 33) as usize % WORDS.len()]
}

/// Mixed corpus: conjunctions, disjunctions, negations, phrases and wildcards
fn generate_queries(count: usize) -> Vec<MonitorQuery> {
    let mut state = BENCH_SEED;
    (0..count)
        .map(|i| {
            let text = match i % 5 {
                0 => format!("{} AND {}", word(&mut state), word(&mut state)),
                1 => format!("{} OR {}", word(&mut state), word(&mut state)),
                2 => format!("{} AND NOT {}", word(&mut state), word(&mut state)),
                3 => format!("\"{} {}\"", word(&mut state), word(&mut state)),
                _ => format!("{}* AND {}", &word(&mut state)[..2], word(&mut state)),
            };
            MonitorQuery::new(format!("q{}", i), text)
        })
        .collect()
}

fn generate_batch(size: usize, analyzer: &StandardAnalyzer) -> DocumentBatch {
    let mut state = BENCH_SEED ^ 0x5555;
    let docs = (0..size)
        .map(|i| {
            let text: Vec<&str> = (0..12).map(|_| word(&mut state)).collect();
            InputDocument::builder(format!("d{}", i))
                .add_field("text", &text.join(" "), analyzer)
                .build()
        })
        .collect();
    DocumentBatch::of(docs)
}

fn populated_monitor(queries: usize, passes: u32) -> (Monitor, Arc<StandardAnalyzer>) {
    let analyzer = Arc::new(StandardAnalyzer::new());
    let parser = Arc::new(StandardQueryParser::new("text", analyzer.clone()));
    let monitor = Monitor::new(parser, Presearcher::new().with_passes(passes));
    monitor.update(generate_queries(queries)).unwrap();
    (monitor, analyzer)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn match_by_corpus_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_corpus");
    group.measurement_time(Duration::from_secs(5));

    for queries in [1_000, 10_000, 100_000] {
        let label = match queries {
            1_000 => "small",
            10_000 => "medium",
            100_000 => "large",
            _ => "custom",
        };
        let (monitor, analyzer) = populated_monitor(queries, 1);
        let batch = generate_batch(16, &analyzer);

        group.throughput(Throughput::Elements(batch.len() as u64));
        group.bench_with_input(BenchmarkId::new(label, queries), &batch, |b, batch| {
            b.iter(|| monitor.match_batch(batch, &SimpleMatcher).unwrap());
        });
    }

    group.finish();
}

fn match_by_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_passes");

    for passes in [1u32, 2, 3] {
        let (monitor, analyzer) = populated_monitor(10_000, passes);
        let batch = generate_batch(16, &analyzer);

        group.bench_with_input(BenchmarkId::from_parameter(passes), &batch, |b, batch| {
            b.iter(|| monitor.match_batch(batch, &SimpleMatcher).unwrap());
        });
    }

    group.finish();
}

fn match_by_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_batch");
    let (monitor, analyzer) = populated_monitor(10_000, 1);

    for size in [1usize, 16, 256] {
        let batch = generate_batch(size, &analyzer);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| monitor.match_batch(batch, &SimpleMatcher).unwrap());
        });
    }

    group.finish();
}

fn update_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    let queries = generate_queries(1_000);
    group.throughput(Throughput::Elements(queries.len() as u64));

    group.bench_function("replace_1000", |b| {
        let (monitor, _) = populated_monitor(10_000, 1);
        b.iter(|| monitor.update(queries.clone()).unwrap());
    });

    group.finish();
}

// ============================================================================
// Criterion Groups and Main
// ============================================================================

criterion_group!(match_benches, match_by_corpus_size, match_by_passes, match_by_batch_size,);

criterion_group!(update_benches, update_throughput,);

criterion_main!(match_benches, update_benches);
