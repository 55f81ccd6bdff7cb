//! Registrable-domain (eTLD+1) utilities
//!
//! Third-party detection compares the registrable domain of the request host
//! with the one of the page. By default a small heuristic is used: the last
//! two labels, or the last three when the last two form a well-known two-part
//! public suffix. A full public suffix list can be supplied instead.
//!
//! # Examples
//!
//! ```
//! use tg_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;

use publicsuffix::{List, Psl};

/// Error returned when a public suffix list cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum SuffixListError {
    #[error("public suffix list is empty")]
    Empty,
    #[error("invalid public suffix list: {0}")]
    Invalid(String),
}

/// Common two-part TLDs for the heuristic.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Source of registrable-domain answers.
#[derive(Default)]
pub enum RegistrableDomains {
    /// Last-two-labels heuristic with the two-part TLD table.
    #[default]
    Heuristic,
    /// A parsed public suffix list.
    List(List),
}

impl RegistrableDomains {
    /// Parse a public suffix list in the standard `public_suffix_list.dat` format.
    pub fn from_list_text(text: &str) -> Result<Self, SuffixListError> {
        if text.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with("//")) {
            return Err(SuffixListError::Empty);
        }
        let list: List = text
            .parse()
            .map_err(|e| SuffixListError::Invalid(format!("{e}")))?;
        Ok(Self::List(list))
    }

    /// Registrable domain of `host`, as a suffix slice of it.
    pub fn etld1<'h>(&self, host: &'h str) -> &'h str {
        let host = host.trim_end_matches('.');
        if is_ip_literal(host) {
            return host;
        }
        match self {
            Self::Heuristic => heuristic_etld1(host),
            Self::List(list) => match list.domain(host.as_bytes()) {
                Some(domain) => {
                    let len = domain.as_bytes().len();
                    &host[host.len().saturating_sub(len)..]
                }
                None => host,
            },
        }
    }

    /// True when `req_host` and `page_domain` have different registrable domains.
    pub fn is_third_party(&self, page_domain: &str, req_host: &str) -> bool {
        !self
            .etld1(page_domain)
            .eq_ignore_ascii_case(self.etld1(req_host))
    }
}

impl std::fmt::Debug for RegistrableDomains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heuristic => f.write_str("Heuristic"),
            Self::List(_) => f.write_str("List(..)"),
        }
    }
}

fn is_ip_literal(host: &str) -> bool {
    host.starts_with('[') || host.parse::<IpAddr>().is_ok()
}

fn heuristic_etld1(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.').map(|(i, _)| i);
    if dots.next().is_none() {
        return host;
    }
    let second = match dots.next() {
        Some(i) => i,
        None => return host,
    };

    let last_two = &host[second + 1..];
    if COMMON_TWO_PART_TLDS
        .iter()
        .any(|tld| tld.eq_ignore_ascii_case(last_two))
    {
        return match dots.next() {
            Some(third) => &host[third + 1..],
            None => host,
        };
    }

    last_two
}

/// Registrable domain using the built-in heuristic.
pub fn get_etld1(host: &str) -> &str {
    RegistrableDomains::Heuristic.etld1(host)
}

/// Check if a request is third-party using the built-in heuristic.
pub fn is_third_party(page_domain: &str, req_host: &str) -> bool {
    RegistrableDomains::Heuristic.is_third_party(page_domain, req_host)
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over a host and each of its parent domains, most specific first.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`,
/// `example.com`, `com`.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.trim_end_matches('.');
    HostSuffixIter {
        current: if host.is_empty() { None } else { Some(host) },
    }
}

/// True when `host` equals `domain` or is a subdomain of it (label boundary).
#[inline]
pub fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    if host.len() < domain.len() || domain.is_empty() {
        return false;
    }
    let split = host.len() - domain.len();
    if !host.is_char_boundary(split) || !host[split..].eq_ignore_ascii_case(domain) {
        return false;
    }
    split == 0 || host.as_bytes()[split - 1] == b'.'
}
