//! Tollgate Core Library
//!
//! This crate provides the matching engine for Tollgate, a network request
//! filter driven by ad-block style rule lists.
//!
//! # Architecture
//!
//! Rules are compiled (by `tg-compiler`) into an immutable [`RuleIndex`].
//! The [`Engine`] serves checks against the current index and swaps in a new
//! one atomically on reload. The hot path borrows from the request and the
//! index and allocates only the candidate list.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hash functions for domain and token hashing
//! - `psl`: Registrable-domain (eTLD+1) lookup, heuristic or public suffix list
//! - `url`: Fast URL parsing without allocations
//! - `pattern`: Rule pattern parsing and matching
//! - `options`: Type, party and domain constraints
//! - `index`: Immutable rule index with host and token buckets
//! - `matcher`: Precedence resolution over index candidates
//! - `engine`: Hot-reloadable shared engine
//! - `types`: Shared type definitions

pub mod engine;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod options;
pub mod pattern;
pub mod psl;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use engine::Engine;
pub use hash::{hash_domain, hash_token, Hash64};
pub use index::{IndexStats, RuleIndex};
pub use matcher::Matcher;
pub use pattern::{Pattern, PatternError, PatternKind};
pub use psl::{get_etld1, is_third_party, RegistrableDomains, SuffixListError};
pub use types::{
    Decision, DomainEntry, DomainScope, PartyMask, RequestContext, RequestType, Rule, RuleKind,
    RuleOptions, Verdict,
};
