//! Tollgate CLI
//!
//! CLI tool for compiling filter lists, checking requests against them and
//! exporting them as content blocker JSON.

mod bench;
mod lists;

use std::fs;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tg_compiler::export_rules;
use tg_core::engine::Engine;
use tg_core::types::{RequestContext, RequestType};

use crate::lists::{DiagnosticReport, VerdictReport};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate filter list compiler and request checker")]
struct Cli {
    /// Public suffix list used for third-party detection
    #[arg(long, global = true)]
    psl: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists and report statistics and diagnostics
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Leave out rules carrying this tag
        #[arg(long = "disable-tag")]
        disable_tag: Vec<String>,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check one request, or every request of a trace file
    Check {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Request URL
        #[arg(long, required_unless_present = "requests")]
        url: Option<String>,

        /// Domain of the page that made the request
        #[arg(long, default_value = "")]
        page: String,

        /// Request type (script, image, xmlhttprequest, sub_frame, ...)
        #[arg(long = "type", default_value = "other")]
        request_type: String,

        /// JSON array of {url, page, type} objects
        #[arg(long, conflicts_with = "url")]
        requests: Option<String>,

        /// Leave out rules carrying this tag
        #[arg(long = "disable-tag")]
        disable_tag: Vec<String>,

        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export compiled rules as WebKit content blocker JSON
    Export {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Leave out rules carrying this tag
        #[arg(long = "disable-tag")]
        disable_tag: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// List every rule that could not be exported
        #[arg(short, long)]
        verbose: bool,
    },

    /// Time lookups over a request trace
    Bench {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// JSON array of {url, page, type} objects
        #[arg(long)]
        requests: String,

        /// Passes over the trace per thread
        #[arg(long, default_value_t = 10)]
        iterations: usize,

        /// Reader threads sharing one engine
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Requests per latency sample
        #[arg(long, default_value_t = 1000)]
        sample_batch: usize,

        /// Rebuild and reload the rules every N ms while threads run
        #[arg(long)]
        reload_every_ms: Option<usize>,

        /// Leave out rules carrying this tag
        #[arg(long = "disable-tag")]
        disable_tag: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            disable_tag,
            json,
            verbose,
        } => cmd_compile(&input, &disable_tag, json, verbose),
        Commands::Check {
            input,
            url,
            page,
            request_type,
            requests,
            disable_tag,
            json,
        } => cmd_check(CheckArgs {
            inputs: &input,
            disabled_tags: &disable_tag,
            psl: cli.psl.as_deref(),
            url: url.as_deref(),
            page: &page,
            request_type: &request_type,
            requests: requests.as_deref(),
            json,
        }),
        Commands::Export {
            input,
            disable_tag,
            output,
            verbose,
        } => cmd_export(&input, &disable_tag, output.as_deref(), verbose),
        Commands::Bench {
            input,
            requests,
            iterations,
            threads,
            sample_batch,
            reload_every_ms,
            disable_tag,
        } => bench::run(bench::BenchOptions {
            input_paths: input,
            disabled_tags: disable_tag,
            psl_path: cli.psl,
            trace_path: requests,
            iterations,
            threads,
            sample_batch_ops: sample_batch,
            reload_every: reload_every_ms,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(inputs: &[String], disabled_tags: &[String], json: bool, verbose: bool) -> Result<(), String> {
    let (compiled, timings) = lists::compile_lists(inputs, disabled_tags, verbose)?;

    if json {
        let reports: Vec<DiagnosticReport<'_>> = compiled.diagnostics.iter().map(DiagnosticReport::from).collect();
        let out = serde_json::json!({
            "lists": compiled.stats.lists,
            "lines": timings.lines,
            "rules_parsed": compiled.stats.parsed_rules,
            "rules_indexed": compiled.stats.index.rules,
            "deduped": compiled.stats.optimize.deduped,
            "tag_disabled": compiled.stats.optimize.tag_disabled,
            "host_anchored": compiled.stats.index.host_anchored,
            "tokenized": compiled.stats.index.tokenized,
            "generic": compiled.stats.index.generic,
            "diagnostics": reports,
        });
        let text = serde_json::to_string_pretty(&out).map_err(|e| format!("Failed to encode JSON: {}", e))?;
        println!("{text}");
        return Ok(());
    }

    let stats = &compiled.stats;
    println!("Compiled {} filter lists", stats.lists);
    println!("  Lines:    {}", timings.lines);
    println!(
        "  Rules:    {} -> {} (dedupe removed {}, disabled tags removed {})",
        stats.parsed_rules, stats.index.rules, stats.optimize.deduped, stats.optimize.tag_disabled
    );
    println!(
        "  Index:    {} host-anchored in {} buckets, {} tokenized in {} buckets, {} generic",
        stats.index.host_anchored,
        stats.index.host_buckets,
        stats.index.tokenized,
        stats.index.token_buckets,
        stats.index.generic
    );
    println!(
        "  Time:     {:.1}ms (read: {:.1}ms, compile: {:.1}ms)",
        timings.read_ms + timings.compile_ms,
        timings.read_ms,
        timings.compile_ms
    );

    if !compiled.diagnostics.is_empty() {
        println!();
        println!("Diagnostics ({}):", compiled.diagnostics.len());
        for d in &compiled.diagnostics {
            println!("  {d}");
        }
    }

    Ok(())
}

fn cmd_export(inputs: &[String], disabled_tags: &[String], output: Option<&str>, verbose: bool) -> Result<(), String> {
    let (compiled, _) = lists::compile_lists(inputs, disabled_tags, false)?;
    if compiled.has_errors() {
        log::warn!("{} diagnostics while compiling; run `compile` to list them", compiled.diagnostics.len());
    }

    let export = export_rules(compiled.index.rules());
    let text = serde_json::to_string_pretty(&export.rules).map_err(|e| format!("Failed to encode JSON: {}", e))?;
    match output {
        Some(path) => fs::write(path, text).map_err(|e| format!("Failed to write '{}': {}", path, e))?,
        None => println!("{text}"),
    }

    eprintln!(
        "Exported {} content blocker rules from {} rules ({} skipped)",
        export.rules.len(),
        compiled.index.len(),
        export.skipped.len()
    );
    if verbose {
        for skipped in &export.skipped {
            eprintln!("  skipped: {} ({})", skipped.rule.source_line, skipped.reason);
        }
    }

    Ok(())
}

struct CheckArgs<'a> {
    inputs: &'a [String],
    disabled_tags: &'a [String],
    psl: Option<&'a str>,
    url: Option<&'a str>,
    page: &'a str,
    request_type: &'a str,
    requests: Option<&'a str>,
    json: bool,
}

fn cmd_check(args: CheckArgs<'_>) -> Result<(), String> {
    let (compiled, _) = lists::compile_lists(args.inputs, args.disabled_tags, false)?;
    if compiled.has_errors() {
        log::warn!("{} diagnostics while compiling; run `compile` to list them", compiled.diagnostics.len());
    }
    let domains = lists::load_registrable_domains(args.psl)?;
    let engine = Engine::with_registrable_domains(compiled.index, domains);

    let trace = match (args.requests, args.url) {
        (Some(path), _) => lists::load_trace(path)?,
        (None, Some(url)) => vec![lists::TraceRequest {
            url: url.to_string(),
            page: args.page.to_string(),
            request_type: args.request_type.to_string(),
        }],
        (None, None) => return Err("Either --url or --requests is required".to_string()),
    };

    // One guard for the whole batch so every verdict comes from one generation.
    let index = engine.load();
    let matcher = tg_core::matcher::Matcher::new(&index);
    let mut reports = Vec::with_capacity(trace.len());
    let mut blocked = 0usize;
    for req in &trace {
        let ctx = RequestContext::with_domains(
            &req.url,
            &req.page,
            RequestType::from_browser_type(&req.request_type),
            engine.registrable_domains(),
        );
        let verdict = matcher.match_request(&ctx);
        if verdict.is_blocked() {
            blocked += 1;
        }
        reports.push(VerdictReport::new(&req.url, &req.page, &req.request_type, &verdict));
    }

    if args.json {
        let text = if reports.len() == 1 && args.requests.is_none() {
            serde_json::to_string_pretty(&reports[0])
        } else {
            serde_json::to_string_pretty(&reports)
        }
        .map_err(|e| format!("Failed to encode JSON: {}", e))?;
        println!("{text}");
        return Ok(());
    }

    for report in &reports {
        println!("{}", report.to_text());
    }
    if reports.len() > 1 {
        println!();
        println!("{} of {} requests blocked", blocked, reports.len());
    }

    Ok(())
}
