//! Tollgate Filter List Compiler
//!
//! This crate compiles ad-block style filter lists into a `tg_core` rule
//! index, collecting diagnostics for everything it had to skip. Compiled
//! rules can also be exported as WebKit content blocker JSON.

pub mod builder;
pub mod content_blocking;
pub mod diagnostics;
pub mod optimizer;
pub mod parser;

pub use builder::{compile_filter_list, compile_filter_lists, CompileOptions, CompileStats, CompiledList};
pub use content_blocking::{export_rules, CbConversionError, CbRule, ContentBlockingExport};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_filter_list, parse_line, parse_rule, ParseError, ParseErrorReason, ParsedLine};
