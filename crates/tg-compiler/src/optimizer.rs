use std::collections::HashSet;

use tg_core::types::Rule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub tag_disabled: usize,
}

/// Drop rules carrying a disabled tag, then exact duplicates.
///
/// Two rules are duplicates when kind, pattern and options are all equal.
/// A block and an exception with the same pattern are never duplicates. The
/// first occurrence is kept so list order is preserved.
pub fn optimize_rules(rules: &mut Vec<Rule>, disabled_tags: &HashSet<String>) -> OptimizeStats {
    let before = rules.len();

    let mut tag_disabled = 0usize;
    if !disabled_tags.is_empty() {
        rules.retain(|rule| match rule.tag() {
            Some(tag) if disabled_tags.contains(tag) => {
                tag_disabled += 1;
                false
            }
            _ => true,
        });
    }

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let after = rules.len();

    OptimizeStats {
        before,
        after,
        deduped,
        tag_disabled,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    kind: tg_core::types::RuleKind,
    pattern: tg_core::pattern::Pattern,
    options: tg_core::types::RuleOptions,
}

impl From<&Rule> for RuleKey {
    fn from(rule: &Rule) -> Self {
        Self {
            kind: rule.kind,
            pattern: rule.pattern.clone(),
            options: rule.options.clone(),
        }
    }
}
