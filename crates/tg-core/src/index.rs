//! Immutable rule index
//!
//! Rules are stored in list order; a rule's position is its id. Three
//! structures narrow the rules a request has to be verified against:
//!
//! - host buckets: `||host` rules keyed by the hash of their anchor host,
//!   looked up with every suffix of the request host
//! - token buckets: other rules keyed by the rarest token their pattern
//!   guarantees, looked up with every token of the URL
//! - generic: rules with no usable token, verified on every request
//!
//! Buckets only produce candidates. The matcher verifies each one, so the
//! index never changes a verdict, only how many rules get looked at.

use std::collections::HashMap;
use std::sync::Arc;

use crate::hash::{hash_domain, Hash64};
use crate::psl::walk_host_suffixes;
use crate::types::Rule;
use crate::url::tokenize_url;

/// Bucket sizes, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub rules: usize,
    pub host_anchored: usize,
    pub tokenized: usize,
    pub generic: usize,
    pub host_buckets: usize,
    pub token_buckets: usize,
}

/// Compiled, read-only rule set. Shared between threads behind an `Arc`.
#[derive(Debug, Default)]
pub struct RuleIndex {
    rules: Vec<Arc<Rule>>,
    host_buckets: HashMap<Hash64, Vec<u32>>,
    token_buckets: HashMap<u32, Vec<u32>>,
    generic: Vec<u32>,
    generation: u64,
}

impl RuleIndex {
    /// Build an index over `rules`, keeping their order.
    pub fn new(rules: Vec<Rule>) -> Self {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();

        let candidate_tokens: Vec<Vec<u32>> = rules.iter().map(|r| r.pattern.index_tokens()).collect();
        let mut frequency: HashMap<u32, usize> = HashMap::new();
        for tokens in &candidate_tokens {
            for &t in tokens {
                *frequency.entry(t).or_insert(0) += 1;
            }
        }

        let mut host_buckets: HashMap<Hash64, Vec<u32>> = HashMap::new();
        let mut token_buckets: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut generic = Vec::new();

        for (id, rule) in rules.iter().enumerate() {
            let id = id as u32;
            if let Some(host) = rule.pattern.host() {
                host_buckets.entry(hash_domain(host)).or_default().push(id);
                continue;
            }
            let rarest = candidate_tokens[id as usize]
                .iter()
                .min_by_key(|&&t| frequency.get(&t).copied().unwrap_or(0));
            match rarest {
                Some(&token) => token_buckets.entry(token).or_default().push(id),
                None => generic.push(id),
            }
        }

        let index = Self {
            rules,
            host_buckets,
            token_buckets,
            generic,
            generation: 0,
        };
        log::debug!("built rule index: {:?}", index.stats());
        index
    }

    /// Index with no rules; every request gets the default allow.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Generation stamped by the engine when this index was installed.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    #[inline]
    pub fn rule(&self, id: u32) -> Option<&Arc<Rule>> {
        self.rules.get(id as usize)
    }

    /// All rules in list order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn stats(&self) -> IndexStats {
        let host_anchored = self.host_buckets.values().map(Vec::len).sum();
        let tokenized = self.token_buckets.values().map(Vec::len).sum();
        IndexStats {
            rules: self.rules.len(),
            host_anchored,
            tokenized,
            generic: self.generic.len(),
            host_buckets: self.host_buckets.len(),
            token_buckets: self.token_buckets.len(),
        }
    }

    /// Collect ids of rules that may match `url`, ascending and deduplicated.
    ///
    /// `req_host` is the host of `url` (empty when it has none).
    pub fn candidates(&self, url: &str, req_host: &str, out: &mut Vec<u32>) {
        out.clear();

        for suffix in walk_host_suffixes(req_host) {
            if let Some(ids) = self.host_buckets.get(&hash_domain(suffix)) {
                out.extend_from_slice(ids);
            }
        }

        if !self.token_buckets.is_empty() {
            for token in tokenize_url(url) {
                if let Some(ids) = self.token_buckets.get(&token) {
                    out.extend_from_slice(ids);
                }
            }
        }

        out.extend_from_slice(&self.generic);
        out.sort_unstable();
        out.dedup();
    }
}
