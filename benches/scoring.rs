//! Benchmarks for pure scoring and extraction.
//!
//! Benchmark targets:
//! - Weighted RRF over two 100-hit lists: <50µs
//! - Extract + Cognify over a 4 KB source file: <5ms
//! - Query routing: <20µs

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use memconsult::config::{FeatureFlags, PipelineConfig, RouterConfig};
use memconsult::models::{RankSource, SearchHit};
use memconsult::pipeline::{cognify, extract};
use memconsult::scoring::{RankedList, weighted_rrf};
use memconsult::strategies::extract_code_blocks;
use memconsult::{Context, Query, QueryRouter};

const SOURCE_UNIT: &str = r#"
class PaymentGateway:
    def __init__(self, client):
        self.client = client

    def charge(self, account, amount):
        if amount <= 0:
            raise ValueError("amount must be positive")
        return self.client.post("/charges", {"account": account, "amount": amount})

def refund(gateway, charge_id):
    return gateway.client.post(f"/charges/{charge_id}/refund", {})

"#;

fn ranked(count: usize, offset: usize) -> Vec<SearchHit> {
    (0..count)
        .map(|i| {
            SearchHit::new(
                format!("doc-{}", i + offset),
                "content",
                1.0 / (i as f32 + 1.0),
            )
        })
        .collect()
}

fn bench_rrf(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_rrf");
    group.measurement_time(Duration::from_secs(5));

    for size in [10usize, 100, 1_000] {
        // Half of each list overlaps the other.
        let vector = ranked(size, 0);
        let keyword = ranked(size, size / 2);
        group.throughput(Throughput::Elements((size * 2) as u64));
        group.bench_with_input(BenchmarkId::new("two_lists", size), &size, |b, _| {
            b.iter(|| {
                weighted_rrf(
                    black_box(&[
                        RankedList::new(RankSource::Vector, 0.7, &vector),
                        RankedList::new(RankSource::Keyword, 0.3, &keyword),
                    ]),
                    60.0,
                    10,
                )
            });
        });
    }

    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("ecl_extraction");
    group.measurement_time(Duration::from_secs(5));
    let config = PipelineConfig::default();

    for repeats in [1usize, 10, 40] {
        let content = SOURCE_UNIT.repeat(repeats);
        group.throughput(Throughput::Bytes(content.len() as u64));

        group.bench_with_input(BenchmarkId::new("extract", repeats), &content, |b, content| {
            b.iter(|| extract(black_box(content), "bench", &config).unwrap());
        });

        let entities = extract(&content, "bench", &config).unwrap().entities;
        group.bench_with_input(
            BenchmarkId::new("cognify", repeats),
            &content,
            |b, content| b.iter(|| cognify(black_box(&entities), content, &config).unwrap()),
        );

        group.bench_with_input(
            BenchmarkId::new("code_blocks", repeats),
            &content,
            |b, content| b.iter(|| extract_code_blocks(black_box(content), 300, 5_000)),
        );
    }

    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let router = QueryRouter::new(RouterConfig::default(), FeatureFlags::all());
    let context = Context::new();
    let queries = [
        ("general", "hello there"),
        ("search", "find similar deployment notes from last quarter"),
        ("error", "find error handling pattern in auth.py"),
        ("memory", "what did we decide previously about caching"),
    ];

    let mut group = c.benchmark_group("routing");
    for (name, text) in queries {
        let query = Query::from(text);
        group.bench_with_input(BenchmarkId::new("route", name), &query, |b, query| {
            b.iter(|| router.route(black_box(query), &context));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rrf, bench_extraction, bench_routing);
criterion_main!(benches);
