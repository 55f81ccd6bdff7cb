//! Core type definitions for Tollgate
//!
//! Rules are produced once by the compiler and never mutated afterwards.
//! Request contexts are built by the network layer and only read here.

use std::fmt;
use std::sync::Arc;

use crate::pattern::Pattern;
use crate::psl::RegistrableDomains;
use crate::url::extract_host;

// =============================================================================
// Rule Kind
// =============================================================================

/// Block or exception. `important` only exists on block rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Block rule; `important` ones cannot be overridden by exceptions.
    Block { important: bool },
    /// Exception rule (`@@...`), suppresses matching non-important blocks.
    Exception,
}

impl RuleKind {
    #[inline]
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception)
    }

    #[inline]
    pub fn is_important(&self) -> bool {
        matches!(self, Self::Block { important: true })
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u16 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// All request types
        const ALL = (1 << 12) - 1;
    }
}

/// Canonical option keyword for each request type, in serialization order.
pub const REQUEST_TYPE_OPTIONS: &[(&str, RequestType)] = &[
    ("script", RequestType::SCRIPT),
    ("image", RequestType::IMAGE),
    ("stylesheet", RequestType::STYLESHEET),
    ("xmlhttprequest", RequestType::XMLHTTPREQUEST),
    ("subdocument", RequestType::SUBDOCUMENT),
    ("document", RequestType::DOCUMENT),
    ("font", RequestType::FONT),
    ("media", RequestType::MEDIA),
    ("object", RequestType::OBJECT),
    ("ping", RequestType::PING),
    ("websocket", RequestType::WEBSOCKET),
    ("other", RequestType::OTHER),
];

impl RequestType {
    /// Parse from a browser request type string (`webRequest` naming).
    /// Unknown names map to `OTHER`.
    pub fn from_browser_type(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::DOCUMENT,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" | "imageset" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" | "xhr" | "fetch" => Self::XMLHTTPREQUEST,
            "ping" | "beacon" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }

    /// Option keyword for a single type flag.
    pub fn option_name(&self) -> Option<&'static str> {
        REQUEST_TYPE_OPTIONS
            .iter()
            .find(|(_, ty)| ty == self)
            .map(|(name, _)| *name)
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Domain Scope
// =============================================================================

/// One `domain=` entry: a lowercase hostname and whether it is included
/// (`a.com`) or excluded (`~a.com`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainEntry {
    pub domain: String,
    pub included: bool,
}

/// Ordered `domain=` entries. Empty means every page domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DomainScope {
    pub entries: Vec<DomainEntry>,
}

impl DomainScope {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn included(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(|e| e.included).map(|e| e.domain.as_str())
    }

    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(|e| !e.included).map(|e| e.domain.as_str())
    }
}

// =============================================================================
// Rule
// =============================================================================

/// Scoping options attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleOptions {
    /// Empty means every request type.
    pub resource_types: RequestType,
    /// Empty means first- and third-party.
    pub party: PartyMask,
    pub domains: DomainScope,
    /// Grouping label for the host's feature toggles. Never matched.
    pub tag: Option<String>,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            resource_types: RequestType::empty(),
            party: PartyMask::empty(),
            domains: DomainScope::default(),
            tag: None,
        }
    }
}

/// One compiled filter rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub pattern: Pattern,
    pub options: RuleOptions,
    /// Original line, kept for diagnostics.
    pub source_line: String,
}

impl Rule {
    pub fn new(kind: RuleKind, pattern: Pattern, options: RuleOptions, source_line: impl Into<String>) -> Self {
        Self {
            kind,
            pattern,
            options,
            source_line: source_line.into(),
        }
    }

    #[inline]
    pub fn tag(&self) -> Option<&str> {
        self.options.tag.as_deref()
    }

    /// Same kind, pattern and options; the source line is ignored.
    pub fn is_equivalent(&self, other: &Rule) -> bool {
        self.kind == other.kind && self.pattern == other.pattern && self.options == other.options
    }
}

/// Canonical rule line: `@@`, pattern, then options in a fixed order.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_exception() {
            f.write_str("@@")?;
        }
        write!(f, "{}", self.pattern)?;

        let mut options: Vec<String> = Vec::new();
        let types = self.options.resource_types;
        if !types.is_empty() {
            for (name, ty) in REQUEST_TYPE_OPTIONS {
                if types.contains(*ty) {
                    options.push((*name).to_string());
                }
            }
        }
        if self.options.party == PartyMask::THIRD_PARTY {
            options.push("third-party".to_string());
        } else if self.options.party == PartyMask::FIRST_PARTY {
            options.push("first-party".to_string());
        }
        if self.kind.is_important() {
            options.push("important".to_string());
        }
        if !self.options.domains.is_empty() {
            let list: Vec<String> = self
                .options
                .domains
                .entries
                .iter()
                .map(|e| if e.included { e.domain.clone() } else { format!("~{}", e.domain) })
                .collect();
            options.push(format!("domain={}", list.join("|")));
        }
        if let Some(tag) = &self.options.tag {
            options.push(format!("tag={tag}"));
        }

        if !options.is_empty() {
            write!(f, "${}", options.join(","))?;
        }
        Ok(())
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request hostname (extracted from URL, empty if none)
    pub req_host: &'a str,
    /// Domain of the document that initiated the request
    pub page_domain: &'a str,
    /// Request type
    pub request_type: RequestType,
    /// Registrable domain of `req_host` differs from the page's
    pub is_third_party: bool,
}

impl<'a> RequestContext<'a> {
    /// Build a context using the built-in registrable-domain heuristic.
    pub fn new(url: &'a str, page_domain: &'a str, request_type: RequestType) -> Self {
        Self::with_domains(url, page_domain, request_type, &RegistrableDomains::Heuristic)
    }

    /// Build a context, deriving `is_third_party` with the given suffix rules.
    ///
    /// A request with no initiating page is treated as first-party.
    pub fn with_domains(
        url: &'a str,
        page_domain: &'a str,
        request_type: RequestType,
        domains: &RegistrableDomains,
    ) -> Self {
        let req_host = extract_host(url).unwrap_or("");
        let page_domain = page_domain.trim_end_matches('.');
        let is_third_party = !page_domain.is_empty()
            && !req_host.is_empty()
            && domains.is_third_party(page_domain, req_host);
        Self {
            url,
            req_host,
            page_domain,
            request_type,
            is_third_party,
        }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Blocked,
    Allowed,
}

/// Result of matching a request.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub decision: Decision,
    /// Rule that determined the decision; `None` for the default allow.
    pub matched_rule: Option<Arc<Rule>>,
    /// Block rule suppressed by the exception in `matched_rule`.
    pub overridden_rule: Option<Arc<Rule>>,
    /// Tag of `matched_rule`, for the host's toggle bookkeeping.
    pub tag: Option<String>,
    /// Generation of the index that produced this verdict.
    pub generation: u64,
}

impl Verdict {
    /// Allowed because nothing matched.
    pub fn default_allow(generation: u64) -> Self {
        Self {
            decision: Decision::Allowed,
            matched_rule: None,
            overridden_rule: None,
            tag: None,
            generation,
        }
    }

    pub(crate) fn from_rule(decision: Decision, rule: &Arc<Rule>, generation: u64) -> Self {
        Self {
            decision,
            tag: rule.options.tag.clone(),
            matched_rule: Some(Arc::clone(rule)),
            overridden_rule: None,
            generation,
        }
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Blocked
    }
}
