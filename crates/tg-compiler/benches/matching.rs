//! Benchmarks for compiling lists and matching requests.
//!
//! Run with: `cargo bench -p tg-compiler`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tg_compiler::{compile_filter_list, CompileOptions};
use tg_core::engine::Engine;
use tg_core::types::{RequestContext, RequestType};

/// Synthetic list mixing host anchors, path tokens, wildcards and exceptions.
fn synthetic_list(rule_count: usize) -> String {
    let mut text = String::new();
    for i in 0..rule_count {
        let line = match i % 5 {
            0 => format!("||ads{i}.example^$third-party"),
            1 => format!("/banner{i}/*$image"),
            2 => format!("||cdn{i}.tracker^*/pixel.gif$domain=site{i}.com|~safe.site{i}.com"),
            3 => format!("@@||ads{}.example/ok/$script", i - 3),
            _ => format!("/track{i}^$ping,xhr,tag=analytics"),
        };
        text.push_str(&line);
        text.push('\n');
    }
    text
}

const REQUESTS: &[(&str, &str, RequestType)] = &[
    ("https://ads10.example/a.js", "news.com", RequestType::SCRIPT),
    ("https://ads10.example/ok/a.js", "news.com", RequestType::SCRIPT),
    ("https://img.host.com/banner11/x.png", "news.com", RequestType::IMAGE),
    ("https://cdn12.tracker/v1/pixel.gif", "site12.com", RequestType::IMAGE),
    ("https://api.news.com/track14?id=1", "news.com", RequestType::XMLHTTPREQUEST),
    ("https://www.news.com/index.html", "news.com", RequestType::DOCUMENT),
];

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for size in [1_000usize, 10_000] {
        let text = synthetic_list(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| compile_filter_list(black_box(text), &CompileOptions::default()))
        });
    }
    group.finish();
}

fn bench_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("match");
    for size in [1_000usize, 10_000, 50_000] {
        let compiled = compile_filter_list(&synthetic_list(size), &CompileOptions::default());
        let engine = Engine::new(compiled.index);
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                for (url, page, ty) in REQUESTS {
                    let ctx = RequestContext::new(url, page, *ty);
                    black_box(engine.check(&ctx));
                }
            })
        });
    }
    group.finish();
}

fn bench_reload(c: &mut Criterion) {
    let text = synthetic_list(10_000);
    let engine = Engine::new(compile_filter_list(&text, &CompileOptions::default()).index);
    c.bench_function("reload_10k", |b| {
        b.iter(|| {
            let index = compile_filter_list(&text, &CompileOptions::default()).index;
            black_box(engine.reload(index))
        })
    });
}

criterion_group!(benches, bench_compile, bench_match, bench_reload);
criterion_main!(benches);
