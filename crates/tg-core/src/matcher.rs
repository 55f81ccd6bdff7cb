//! Core Matching Engine
//!
//! This is the hot path: every request goes through here. The index narrows
//! the rules to verify; each candidate is checked for options first (cheap)
//! and pattern second.
//!
//! Precedence is fixed: important block, then exception, then block, then
//! the default allow. Within a class the earliest rule in list order wins.

use std::sync::Arc;

use crate::index::RuleIndex;
use crate::options::applies;
use crate::types::{Decision, RequestContext, Rule, Verdict};
use crate::url::get_host_position;

/// Matches requests against one [`RuleIndex`].
pub struct Matcher<'a> {
    index: &'a RuleIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a RuleIndex) -> Self {
        Self { index }
    }

    /// Match a request and return the decision.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> Verdict {
        let generation = self.index.generation();
        let mut candidates = Vec::new();
        self.index.candidates(ctx.url, ctx.req_host, &mut candidates);
        if candidates.is_empty() {
            return Verdict::default_allow(generation);
        }

        let host = get_host_position(ctx.url);
        let mut best_important_block: Option<&Arc<Rule>> = None;
        let mut best_allow: Option<&Arc<Rule>> = None;
        let mut best_block: Option<&Arc<Rule>> = None;

        for id in candidates {
            let rule = match self.index.rule(id) {
                Some(rule) => rule,
                None => continue,
            };

            let slot = if rule.kind.is_important() {
                &mut best_important_block
            } else if rule.kind.is_exception() {
                &mut best_allow
            } else {
                &mut best_block
            };
            if slot.is_some() {
                continue;
            }

            if !applies(&rule.options, ctx) || !rule.pattern.matches_with_host(ctx.url, host) {
                continue;
            }
            *slot = Some(rule);

            // Nothing can outrank an important block, and ids only increase.
            if best_important_block.is_some() {
                break;
            }
        }

        self.apply_precedence(best_important_block, best_allow, best_block, generation)
    }

    fn apply_precedence(
        &self,
        best_important_block: Option<&Arc<Rule>>,
        best_allow: Option<&Arc<Rule>>,
        best_block: Option<&Arc<Rule>>,
        generation: u64,
    ) -> Verdict {
        if let Some(rule) = best_important_block {
            log::trace!("blocked by important rule `{}`", rule.source_line);
            return Verdict::from_rule(Decision::Blocked, rule, generation);
        }

        if let Some(rule) = best_allow {
            let mut verdict = Verdict::from_rule(Decision::Allowed, rule, generation);
            if let Some(block) = best_block {
                log::trace!(
                    "exception `{}` overrides `{}`",
                    rule.source_line,
                    block.source_line
                );
                verdict.overridden_rule = Some(Arc::clone(block));
            }
            return verdict;
        }

        if let Some(rule) = best_block {
            log::trace!("blocked by `{}`", rule.source_line);
            return Verdict::from_rule(Decision::Blocked, rule, generation);
        }

        Verdict::default_allow(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::types::{DomainEntry, DomainScope, PartyMask, RequestType, RuleKind, RuleOptions};

    fn rule(kind: RuleKind, pattern: &str, options: RuleOptions) -> Rule {
        Rule::new(kind, Pattern::parse(pattern).unwrap(), options, pattern)
    }

    const BLOCK: RuleKind = RuleKind::Block { important: false };
    const IMPORTANT: RuleKind = RuleKind::Block { important: true };

    fn check(index: &RuleIndex, url: &str, page: &str, ty: RequestType) -> Verdict {
        Matcher::new(index).match_request(&RequestContext::new(url, page, ty))
    }

    #[test]
    fn test_default_allow() {
        let index = RuleIndex::new(vec![rule(BLOCK, "||ads.com^", RuleOptions::default())]);
        let verdict = check(&index, "https://example.com/", "example.com", RequestType::DOCUMENT);
        assert_eq!(verdict.decision, Decision::Allowed);
        assert!(verdict.matched_rule.is_none());
    }

    #[test]
    fn test_third_party_host_block() {
        let options = RuleOptions {
            party: PartyMask::THIRD_PARTY,
            ..Default::default()
        };
        let index = RuleIndex::new(vec![rule(BLOCK, "||ntv.io^", options)]);

        let verdict = check(&index, "https://ntv.io/x.js", "example.com", RequestType::SCRIPT);
        assert!(verdict.is_blocked());
        assert_eq!(verdict.matched_rule.unwrap().source_line, "||ntv.io^");

        let verdict = check(&index, "https://ntv.io/x.js", "ntv.io", RequestType::SCRIPT);
        assert!(!verdict.is_blocked());

        let verdict = check(&index, "https://notntv.io/x.js", "example.com", RequestType::SCRIPT);
        assert!(!verdict.is_blocked());
    }

    #[test]
    fn test_exception_overrides_block() {
        let index = RuleIndex::new(vec![
            rule(BLOCK, "||ads.com^", RuleOptions::default()),
            rule(RuleKind::Exception, "||ads.com/ok/", RuleOptions::default()),
        ]);

        let verdict = check(&index, "https://ads.com/ok/a.js", "site.com", RequestType::SCRIPT);
        assert_eq!(verdict.decision, Decision::Allowed);
        assert_eq!(verdict.matched_rule.unwrap().source_line, "||ads.com/ok/");
        assert_eq!(verdict.overridden_rule.unwrap().source_line, "||ads.com^");

        let verdict = check(&index, "https://ads.com/bad/a.js", "site.com", RequestType::SCRIPT);
        assert!(verdict.is_blocked());
    }

    #[test]
    fn test_important_beats_exception() {
        let index = RuleIndex::new(vec![
            rule(RuleKind::Exception, "||ads.com^", RuleOptions::default()),
            rule(IMPORTANT, "||ads.com^", RuleOptions::default()),
        ]);
        let verdict = check(&index, "https://ads.com/x", "site.com", RequestType::SCRIPT);
        assert!(verdict.is_blocked());
        assert!(verdict.matched_rule.unwrap().kind.is_important());
        assert!(verdict.overridden_rule.is_none());
    }

    #[test]
    fn test_exception_without_block_still_reported() {
        let index = RuleIndex::new(vec![rule(RuleKind::Exception, "/ok/", RuleOptions::default())]);
        let verdict = check(&index, "https://x.com/ok/", "x.com", RequestType::OTHER);
        assert_eq!(verdict.decision, Decision::Allowed);
        assert!(verdict.matched_rule.is_some());
        assert!(verdict.overridden_rule.is_none());
    }

    #[test]
    fn test_first_rule_in_list_order_reported() {
        let index = RuleIndex::new(vec![
            rule(BLOCK, "/banner/", RuleOptions::default()),
            rule(BLOCK, "||x.com^", RuleOptions::default()),
        ]);
        let verdict = check(&index, "https://x.com/banner/", "x.com", RequestType::IMAGE);
        assert_eq!(verdict.matched_rule.unwrap().source_line, "/banner/");
    }

    #[test]
    fn test_domain_scoped_exception() {
        let scope = DomainScope {
            entries: ["msnbc.com", "sky.com", "cnbc.com"]
                .iter()
                .map(|d| DomainEntry {
                    domain: d.to_string(),
                    included: true,
                })
                .collect(),
        };
        let index = RuleIndex::new(vec![
            rule(BLOCK, "||adm.fwmrm.net^*/AdManager.js", RuleOptions::default()),
            rule(
                RuleKind::Exception,
                "||adm.fwmrm.net^*/AdManager.js",
                RuleOptions {
                    domains: scope,
                    ..Default::default()
                },
            ),
        ]);
        let url = "https://adm.fwmrm.net/foo/AdManager.js";
        assert!(!check(&index, url, "sky.com", RequestType::SCRIPT).is_blocked());
        assert!(check(&index, url, "other.com", RequestType::SCRIPT).is_blocked());
    }

    #[test]
    fn test_type_scoped_rule() {
        let options = RuleOptions {
            resource_types: RequestType::IMAGE,
            ..Default::default()
        };
        let index = RuleIndex::new(vec![rule(BLOCK, "/pixel.", options)]);
        assert!(check(&index, "https://t.com/pixel.gif", "a.com", RequestType::IMAGE).is_blocked());
        assert!(!check(&index, "https://t.com/pixel.gif", "a.com", RequestType::SCRIPT).is_blocked());
    }
}
