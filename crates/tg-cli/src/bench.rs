use std::cmp::Ordering;
use std::thread;
use std::time::Instant;

use tg_compiler::{compile_filter_list, CompileOptions};
use tg_core::engine::Engine;
use tg_core::types::{RequestContext, RequestType};

use crate::lists::{self, TraceRequest};

pub struct BenchOptions {
    pub input_paths: Vec<String>,
    pub disabled_tags: Vec<String>,
    pub psl_path: Option<String>,
    pub trace_path: String,
    pub iterations: usize,
    pub threads: usize,
    pub sample_batch_ops: usize,
    pub reload_every: Option<usize>,
}

struct BenchRequest {
    url: String,
    page: String,
    request_type: RequestType,
}

impl From<&TraceRequest> for BenchRequest {
    fn from(req: &TraceRequest) -> Self {
        Self {
            url: req.url.clone(),
            page: req.page.clone(),
            request_type: req.request_type(),
        }
    }
}

struct BenchResult {
    name: String,
    op_count: usize,
    total_ms: f64,
    avg_us: f64,
    p50_us: f64,
    p95_us: f64,
    p99_us: f64,
    ops_per_sec: u64,
    blocked_pct: f64,
}

pub fn run(opts: BenchOptions) -> Result<(), String> {
    println!("============================================================");
    println!("Tollgate lookup benchmark");
    println!("============================================================");

    let (compiled, timings) = lists::compile_lists(&opts.input_paths, &opts.disabled_tags, true)?;
    println!(
        "Compiled {} list(s): {} lines -> {} rules in {:.1}ms",
        opts.input_paths.len(),
        timings.lines,
        compiled.index.len(),
        timings.compile_ms
    );

    let domains = lists::load_registrable_domains(opts.psl_path.as_deref())?;
    let engine = Engine::with_registrable_domains(compiled.index, domains);

    let requests: Vec<BenchRequest> = lists::load_trace(&opts.trace_path)?
        .iter()
        .map(BenchRequest::from)
        .collect();
    if requests.is_empty() {
        return Err(format!("Trace '{}' contains no requests", opts.trace_path));
    }
    println!("Trace: {} requests, {} iteration(s)", requests.len(), opts.iterations);

    warmup(&engine, &requests);

    let threads = opts.threads.max(1);
    let start = Instant::now();
    let results = run_readers(&engine, &requests, threads, &opts)?;
    let wall_ms = start.elapsed().as_secs_f64() * 1000.0;

    for result in &results {
        println!();
        println!("{}", format_result(result));
    }

    if results.len() > 1 {
        let total_ops: usize = results.iter().map(|r| r.op_count).sum();
        println!();
        println!(
            "Aggregate: {} ops in {:.2} ms wall, {} ops/sec",
            total_ops,
            wall_ms,
            if wall_ms > 0.0 { (total_ops as f64 / (wall_ms / 1000.0)) as u64 } else { 0 }
        );
    }
    println!("Final generation: {}", engine.generation());

    Ok(())
}

/// Run `threads` readers over the trace. The reload loop, when enabled,
/// runs on the calling thread for as long as any reader is still going.
fn run_readers(
    engine: &Engine,
    requests: &[BenchRequest],
    threads: usize,
    opts: &BenchOptions,
) -> Result<Vec<BenchResult>, String> {
    thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let name = if threads == 1 { "check".to_string() } else { format!("check[thread {i}]") };
                scope.spawn(move || {
                    run_bench_batched(&name, engine, requests, opts.iterations, opts.sample_batch_ops)
                })
            })
            .collect();

        if let Some(every) = opts.reload_every {
            reload_loop(engine, &compiled_rules_text(engine), every, &handles);
        }

        let mut results = Vec::with_capacity(threads);
        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle
                .join()
                .map_err(|_| format!("Reader thread {i} panicked"))?;
            results.push(result);
        }
        Ok(results)
    })
}

/// Current rules, serialized so the reload loop can rebuild equal generations.
fn compiled_rules_text(engine: &Engine) -> String {
    let index = engine.load();
    index
        .rules()
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rebuild and reinstall the rule set until every reader has finished.
/// Reloads at least once.
fn reload_loop<T>(engine: &Engine, text: &str, every_ms: usize, readers: &[thread::ScopedJoinHandle<'_, T>]) {
    let mut reloads = 0usize;
    loop {
        thread::sleep(std::time::Duration::from_millis(every_ms as u64));
        let compiled = compile_filter_list(text, &CompileOptions::default());
        engine.reload(compiled.index);
        reloads += 1;
        if readers.iter().all(|h| h.is_finished()) {
            break;
        }
    }
    println!("Reloads during run: {}", reloads);
}

fn warmup(engine: &Engine, requests: &[BenchRequest]) {
    for _ in 0..10 {
        for req in requests {
            let _ = check(engine, req);
        }
    }
}

#[inline]
fn check(engine: &Engine, req: &BenchRequest) -> bool {
    let ctx = RequestContext::with_domains(
        &req.url,
        &req.page,
        req.request_type,
        engine.registrable_domains(),
    );
    engine.check(&ctx).is_blocked()
}

fn run_bench_batched(
    name: &str,
    engine: &Engine,
    requests: &[BenchRequest],
    iterations: usize,
    sample_batch_ops: usize,
) -> BenchResult {
    let sample_batch_ops = sample_batch_ops.max(1);
    let mut samples_us = Vec::new();
    let mut blocked = 0usize;
    let total_ops = requests.len() * iterations.max(1);

    let mut batch_ops = 0usize;
    let mut batch_start = Instant::now();
    let start = Instant::now();

    for _ in 0..iterations.max(1) {
        for req in requests {
            if check(engine, req) {
                blocked += 1;
            }
            batch_ops += 1;
            if batch_ops == sample_batch_ops {
                let dt = batch_start.elapsed();
                let us_per_op = dt.as_secs_f64() * 1_000_000.0 / sample_batch_ops as f64;
                samples_us.push(us_per_op);
                batch_ops = 0;
                batch_start = Instant::now();
            }
        }
    }

    let total_ms = start.elapsed().as_secs_f64() * 1000.0;
    samples_us.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let avg_us = if total_ops == 0 { 0.0 } else { total_ms * 1000.0 / total_ops as f64 };

    BenchResult {
        name: name.to_string(),
        op_count: total_ops,
        total_ms,
        avg_us,
        p50_us: percentile(&samples_us, 0.50),
        p95_us: percentile(&samples_us, 0.95),
        p99_us: percentile(&samples_us, 0.99),
        ops_per_sec: if total_ms > 0.0 { (total_ops as f64 / (total_ms / 1000.0)) as u64 } else { 0 },
        blocked_pct: if total_ops > 0 { (blocked as f64 / total_ops as f64) * 100.0 } else { 0.0 },
    }
}

fn format_result(result: &BenchResult) -> String {
    format!(
        "{}:\n  Ops: {}\n  Total: {:.2} ms\n  Avg: {:.2} us\n  P50: {:.2} us\n  P95: {:.2} us\n  P99: {:.2} us\n  Throughput: {} ops/sec\n  Blocked: {:.1}%",
        result.name,
        result.op_count,
        result.total_ms,
        result.avg_us,
        result.p50_us,
        result.p95_us,
        result.p99_us,
        result.ops_per_sec,
        result.blocked_pct,
    )
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}
