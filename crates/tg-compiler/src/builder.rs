use std::collections::HashSet;

use tg_core::index::{IndexStats, RuleIndex};

use crate::diagnostics::Diagnostic;
use crate::optimizer::{optimize_rules, OptimizeStats};
use crate::parser::parse_filter_list;

/// Settings for building one index generation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Rules tagged with any of these are left out of the index.
    pub disabled_tags: HashSet<String>,
}

impl CompileOptions {
    pub fn disable_tag(mut self, tag: impl Into<String>) -> Self {
        self.disabled_tags.insert(tag.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub lists: usize,
    pub parsed_rules: usize,
    pub optimize: OptimizeStats,
    pub index: IndexStats,
}

/// Result of compiling one or more lists.
#[derive(Debug)]
pub struct CompiledList {
    pub index: RuleIndex,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CompileStats,
}

impl CompiledList {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::diagnostics::Severity::Error)
    }
}

/// Compile a single list.
pub fn compile_filter_list(text: &str, options: &CompileOptions) -> CompiledList {
    compile_filter_lists(&[text], options)
}

/// Compile several lists into one index, in the order given.
///
/// Never fails. Malformed lines, unsupported syntax and empty lists are
/// reported as diagnostics.
pub fn compile_filter_lists<S: AsRef<str>>(lists: &[S], options: &CompileOptions) -> CompiledList {
    let mut rules = Vec::new();
    let mut diagnostics = Vec::new();

    for (list_id, text) in lists.iter().enumerate() {
        let parsed = parse_filter_list(text.as_ref());
        if parsed.rules.is_empty() {
            log::warn!("filter list {list_id} contains no valid rules");
            diagnostics.push(Diagnostic::empty_list().with_list_id(list_id));
        }
        diagnostics.extend(parsed.diagnostics.into_iter().map(|d| d.with_list_id(list_id)));
        rules.extend(parsed.rules);
    }

    let parsed_rules = rules.len();
    let optimize = optimize_rules(&mut rules, &options.disabled_tags);
    let index = RuleIndex::new(rules);

    let stats = CompileStats {
        lists: lists.len(),
        parsed_rules,
        optimize,
        index: index.stats(),
    };
    log::debug!(
        "compiled {} lists: {} rules parsed, {} indexed, {} diagnostics",
        stats.lists,
        parsed_rules,
        stats.index.rules,
        diagnostics.len()
    );

    CompiledList {
        index,
        diagnostics,
        stats,
    }
}
