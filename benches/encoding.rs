use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nmt_datagen::vocabulary::DEFAULT_FACTOR;
use nmt_datagen::{AlignedLineTuple, ParallelTokenizer, Result, RunningStats, Vocabulary};

struct WhitespaceVocabulary;

impl Vocabulary for WhitespaceVocabulary {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.split_whitespace().map(str::to_owned).collect())
    }

    fn tokenize_with_factors(&self, text: &str, factors: &str) -> Result<(Vec<String>, Vec<String>)> {
        let tokens = self.tokenize(text)?;
        let mut labels: Vec<String> = factors.split_whitespace().map(str::to_owned).collect();
        labels.resize(tokens.len(), DEFAULT_FACTOR.to_owned());
        Ok((tokens, labels))
    }
}

fn build_batch(lines: usize) -> Vec<AlignedLineTuple> {
    (0..lines)
        .map(|idx| AlignedLineTuple::WithoutFactor {
            source: format!("the quick brown fox {idx} jumps over the lazy dog"),
            target: format!("la volpe marrone {idx} salta sopra il cane pigro e veloce"),
        })
        .collect()
}

fn bench_running_stats(c: &mut Criterion) {
    let ratios: Vec<f64> = (0..100_000).map(|idx| 0.5 + (idx % 37) as f64 / 20.0).collect();
    let mut group = c.benchmark_group("running_stats");
    group.throughput(Throughput::Elements(ratios.len() as u64));
    group.bench_function("add_100k", |b| {
        b.iter(|| {
            let mut stats = RunningStats::new();
            for ratio in &ratios {
                stats.add(*ratio);
            }
            black_box(stats.estimate().expect("non-empty"))
        });
    });
    group.finish();
}

fn bench_map_batch(c: &mut Criterion) {
    let batch = build_batch(4096);
    let mut group = c.benchmark_group("map_batch");
    group.throughput(Throughput::Elements(batch.len() as u64));
    for workers in [1usize, 4] {
        let tokenizer =
            ParallelTokenizer::new(Arc::new(WhitespaceVocabulary), workers).expect("pool");
        group.bench_with_input(BenchmarkId::from_parameter(workers), &batch, |b, batch| {
            b.iter(|| black_box(tokenizer.map_batch(batch).expect("tokenize")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_running_stats, bench_map_batch);
criterion_main!(benches);
