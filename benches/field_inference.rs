//! Field Inference Benchmarks
//!
//! Label classification, field name normalization and candidate planning
//! over synthetic oracle output.
//!
//! Run with: `cargo bench --bench field_inference`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use formins_server::forms::{
    classify, normalize_field_name, plan_fields, AnalyzerOptions, KeywordTable, PageSize,
};
use formins_server::oracle::{NormalizedVertex, TextBlock};

const LABELS: &[&str] = &[
    "Full Name: ______________",
    "Date of Birth*: ___/___/___",
    "Mobile Phone: __________",
    "E-mail Address: ________",
    "I agree to the terms above: Yes / No",
    "Applicant Signature: ____________",
    "Tel: 555-0100 Fax: 555-0101 www.example.com",
    "Mailing Address (street, city, postcode):",
];

/// A form with `rows` prompts per page, stacked down each page
fn synthetic_blocks(pages: usize, rows: usize) -> Vec<TextBlock> {
    let mut blocks = Vec::with_capacity(pages * rows);
    for page_index in 0..pages {
        for row in 0..rows {
            let x = 0.08;
            let y = 0.05 + row as f64 * (0.9 / rows as f64);
            blocks.push(TextBlock {
                page_index,
                text: format!("{} {}", LABELS[row % LABELS.len()], row),
                vertices: vec![
                    NormalizedVertex::new(x, y),
                    NormalizedVertex::new(x + 0.4, y),
                    NormalizedVertex::new(x + 0.4, y + 0.015),
                    NormalizedVertex::new(x, y + 0.015),
                ],
            });
        }
    }
    blocks
}

/// Benchmark keyword classification of prompt labels
fn bench_classify(c: &mut Criterion) {
    let table = KeywordTable::default();
    let mut group = c.benchmark_group("classify");

    group.bench_function("labels", |b| {
        b.iter(|| {
            for label in LABELS {
                black_box(classify(black_box(label), black_box(label), &table));
            }
        })
    });

    group.finish();
}

/// Benchmark label to identifier normalization
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_field_name");
    group.throughput(Throughput::Elements(LABELS.len() as u64));

    group.bench_function("labels", |b| {
        b.iter(|| {
            for label in LABELS {
                black_box(normalize_field_name(black_box(label)));
            }
        })
    });

    group.finish();
}

/// Benchmark planning candidates from oracle blocks
fn bench_plan_fields(c: &mut Criterion) {
    let options = AnalyzerOptions {
        all_pages: true,
        ..Default::default()
    };
    let mut group = c.benchmark_group("plan_fields");

    for pages in [1usize, 10, 50] {
        let blocks = synthetic_blocks(pages, 24);
        let page_sizes = vec![PageSize::LETTER; pages];
        group.throughput(Throughput::Elements(blocks.len() as u64));

        group.bench_with_input(BenchmarkId::new("pages", pages), &blocks, |b, blocks| {
            b.iter(|| black_box(plan_fields(black_box(blocks), &page_sizes, &options)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_normalize, bench_plan_fields);
criterion_main!(benches);
