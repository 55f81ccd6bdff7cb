use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use tg_compiler::{compile_filter_lists, CompileOptions, CompiledList, Diagnostic};
use tg_core::psl::RegistrableDomains;
use tg_core::types::{Decision, RequestType, Verdict};

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileTimings {
    pub lines: usize,
    pub read_ms: f64,
    pub compile_ms: f64,
}

/// Read and compile filter list files in order.
pub fn compile_lists(
    inputs: &[String],
    disabled_tags: &[String],
    verbose: bool,
) -> Result<(CompiledList, CompileTimings), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut texts = Vec::with_capacity(inputs.len());
    let mut lines = 0usize;

    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let line_count = content.lines().count();
        lines += line_count;

        if verbose {
            println!(
                "  [{}] {} - {} lines",
                list_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                line_count
            );
        }
        texts.push(content);
    }
    let read_ms = start.elapsed().as_secs_f64() * 1000.0;

    let options = CompileOptions {
        disabled_tags: disabled_tags.iter().cloned().collect::<HashSet<_>>(),
    };
    let compile_start = Instant::now();
    let compiled = compile_filter_lists(&texts, &options);
    let compile_ms = compile_start.elapsed().as_secs_f64() * 1000.0;

    Ok((
        compiled,
        CompileTimings {
            lines,
            read_ms,
            compile_ms,
        },
    ))
}

/// Built-in heuristic, or the public suffix list at `path`.
pub fn load_registrable_domains(path: Option<&str>) -> Result<RegistrableDomains, String> {
    let path = match path {
        Some(path) => path,
        None => return Ok(RegistrableDomains::Heuristic),
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read public suffix list '{}': {}", path, e))?;
    RegistrableDomains::from_list_text(&text).map_err(|e| format!("'{}': {}", path, e))
}

/// One request from a JSON trace file.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceRequest {
    pub url: String,
    #[serde(default)]
    pub page: String,
    #[serde(rename = "type", default = "default_request_type")]
    pub request_type: String,
}

fn default_request_type() -> String {
    "other".to_string()
}

impl TraceRequest {
    pub fn request_type(&self) -> RequestType {
        RequestType::from_browser_type(&self.request_type)
    }
}

/// Read a JSON array of `{url, page, type}` objects.
pub fn load_trace(path: &str) -> Result<Vec<TraceRequest>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read trace '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid trace '{}': {}", path, e))
}

#[derive(Debug, Serialize)]
pub struct VerdictReport<'a> {
    pub url: &'a str,
    pub page: &'a str,
    #[serde(rename = "type")]
    pub request_type: &'a str,
    pub decision: &'static str,
    pub matched_rule: Option<String>,
    pub overridden_rule: Option<String>,
    pub tag: Option<String>,
    pub generation: u64,
}

impl<'a> VerdictReport<'a> {
    pub fn new(url: &'a str, page: &'a str, request_type: &'a str, verdict: &Verdict) -> Self {
        Self {
            url,
            page,
            request_type,
            decision: match verdict.decision {
                Decision::Blocked => "blocked",
                Decision::Allowed => "allowed",
            },
            matched_rule: verdict.matched_rule.as_ref().map(|r| r.source_line.clone()),
            overridden_rule: verdict.overridden_rule.as_ref().map(|r| r.source_line.clone()),
            tag: verdict.tag.clone(),
            generation: verdict.generation,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("{:<7} {} (page: {}, type: {})", self.decision, self.url, self.page, self.request_type);
        if let Some(rule) = &self.matched_rule {
            out.push_str(&format!("\n  rule:       {}", rule));
        }
        if let Some(rule) = &self.overridden_rule {
            out.push_str(&format!("\n  overrides:  {}", rule));
        }
        if let Some(tag) = &self.tag {
            out.push_str(&format!("\n  tag:        {}", tag));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport<'a> {
    pub list: usize,
    pub line: usize,
    pub severity: String,
    pub kind: &'static str,
    pub message: &'a str,
    pub source: &'a str,
}

impl<'a> From<&'a Diagnostic> for DiagnosticReport<'a> {
    fn from(d: &'a Diagnostic) -> Self {
        Self {
            list: d.list_id,
            line: d.line,
            severity: d.severity.to_string(),
            kind: d.kind.as_str(),
            message: &d.message,
            source: &d.source,
        }
    }
}
