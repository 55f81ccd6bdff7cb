//! Hot-reloadable matching engine
//!
//! The engine holds the current [`RuleIndex`] behind an `ArcSwap`. Checks
//! load the index without locking and keep it alive for the whole match;
//! a reload publishes a new index atomically. A check therefore sees either
//! the old index or the new one, never a mix.
//!
//! ```text
//! check()  -> ArcSwap::load() -> RuleIndex (lock-free read)
//! reload() -> ArcSwap::swap() -> old index dropped when readers finish
//! ```
//!
//! Reloads are serialized by a writer lock that also owns the generation
//! counter, so installed generations only ever increase. Readers never take
//! the lock.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, Guard};

use crate::index::RuleIndex;
use crate::matcher::Matcher;
use crate::psl::RegistrableDomains;
use crate::types::{RequestContext, RequestType, Verdict};

/// Shared entry point for request checks.
///
/// `Engine` is `Send + Sync`; share it with `Arc<Engine>`.
#[derive(Debug)]
pub struct Engine {
    current: ArcSwap<RuleIndex>,
    /// Next generation to stamp. Held for the whole reload.
    next_generation: Mutex<u64>,
    domains: RegistrableDomains,
}

impl Engine {
    /// Create an engine serving `index` as generation 1.
    pub fn new(index: RuleIndex) -> Self {
        Self::with_registrable_domains(index, RegistrableDomains::default())
    }

    /// Create an engine that derives third-party status with `domains`.
    pub fn with_registrable_domains(mut index: RuleIndex, domains: RegistrableDomains) -> Self {
        index.set_generation(1);
        Self {
            current: ArcSwap::from_pointee(index),
            next_generation: Mutex::new(2),
            domains,
        }
    }

    /// Current index. Holding the guard keeps this generation alive.
    #[inline]
    pub fn load(&self) -> Guard<Arc<RuleIndex>> {
        self.current.load()
    }

    /// Generation of the index currently installed.
    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Suffix rules used by [`Engine::request`].
    pub fn registrable_domains(&self) -> &RegistrableDomains {
        &self.domains
    }

    /// Install `index` as the next generation. Returns the generation it
    /// replaced. In-flight checks finish on the index they started with.
    ///
    /// Concurrent reloads are applied one at a time, in the order they take
    /// the writer lock.
    pub fn reload(&self, mut index: RuleIndex) -> u64 {
        let mut next = self
            .next_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = *next;
        *next += 1;
        index.set_generation(generation);
        let rules = index.len();
        let old = self.current.swap(Arc::new(index));
        drop(next);
        log::debug!(
            "installed rule index generation {generation} ({rules} rules), replacing {}",
            old.generation()
        );
        old.generation()
    }

    /// Match a prepared request context against the current index.
    pub fn check(&self, ctx: &RequestContext<'_>) -> Verdict {
        let index = self.current.load();
        Matcher::new(&index).match_request(ctx)
    }

    /// Build the request context with this engine's suffix rules and match it.
    pub fn request(&self, url: &str, page_domain: &str, request_type: RequestType) -> Verdict {
        let ctx = RequestContext::with_domains(url, page_domain, request_type, &self.domains);
        self.check(&ctx)
    }
}
