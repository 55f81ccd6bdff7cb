//! Option constraint evaluation
//!
//! A rule's options restrict which requests its pattern may apply to. All
//! constraints must hold; an empty constraint never restricts anything.

use crate::psl::is_same_or_subdomain;
use crate::types::{DomainScope, PartyMask, RequestContext, RequestType, RuleOptions};

/// Check every option constraint of a rule against the request.
#[inline]
pub fn applies(options: &RuleOptions, ctx: &RequestContext<'_>) -> bool {
    type_applies(options.resource_types, ctx.request_type)
        && party_applies(options.party, ctx.is_third_party)
        && domain_applies(&options.domains, ctx.page_domain)
}

#[inline]
fn type_applies(mask: RequestType, request_type: RequestType) -> bool {
    mask.is_empty() || mask.intersects(request_type)
}

#[inline]
fn party_applies(mask: PartyMask, is_third_party: bool) -> bool {
    if mask.is_empty() {
        return true;
    }
    if is_third_party {
        mask.contains(PartyMask::THIRD_PARTY)
    } else {
        mask.contains(PartyMask::FIRST_PARTY)
    }
}

/// Exclusions win over inclusions. When any entry is an inclusion, the page
/// must fall under one of them; exclusions alone leave every other page in.
fn domain_applies(scope: &DomainScope, page_domain: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    if scope.excluded().any(|d| is_same_or_subdomain(page_domain, d)) {
        return false;
    }
    let mut included = scope.included().peekable();
    if included.peek().is_none() {
        return true;
    }
    included.any(|d| is_same_or_subdomain(page_domain, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DomainEntry;

    fn scope(entries: &[(&str, bool)]) -> DomainScope {
        DomainScope {
            entries: entries
                .iter()
                .map(|(d, included)| DomainEntry {
                    domain: d.to_string(),
                    included: *included,
                })
                .collect(),
        }
    }

    fn ctx<'a>(url: &'a str, page: &'a str, ty: RequestType) -> RequestContext<'a> {
        RequestContext::new(url, page, ty)
    }

    #[test]
    fn test_empty_options_apply_everywhere() {
        let options = RuleOptions::default();
        assert!(applies(&options, &ctx("https://a.com/x", "b.com", RequestType::IMAGE)));
        assert!(applies(&options, &ctx("https://a.com/x", "", RequestType::OTHER)));
    }

    #[test]
    fn test_type_mask() {
        let options = RuleOptions {
            resource_types: RequestType::SCRIPT | RequestType::IMAGE,
            ..Default::default()
        };
        assert!(applies(&options, &ctx("https://a.com/x", "", RequestType::SCRIPT)));
        assert!(!applies(&options, &ctx("https://a.com/x", "", RequestType::STYLESHEET)));
    }

    #[test]
    fn test_party_mask() {
        let third = RuleOptions {
            party: PartyMask::THIRD_PARTY,
            ..Default::default()
        };
        assert!(applies(&third, &ctx("https://ntv.io/x.js", "example.com", RequestType::SCRIPT)));
        assert!(!applies(&third, &ctx("https://ntv.io/x.js", "ntv.io", RequestType::SCRIPT)));

        let first = RuleOptions {
            party: PartyMask::FIRST_PARTY,
            ..Default::default()
        };
        assert!(applies(&first, &ctx("https://cdn.ntv.io/x.js", "ntv.io", RequestType::SCRIPT)));
        assert!(!applies(&first, &ctx("https://ntv.io/x.js", "example.com", RequestType::SCRIPT)));
    }

    #[test]
    fn test_domain_inclusion() {
        let s = scope(&[("msnbc.com", true), ("sky.com", true)]);
        assert!(domain_applies(&s, "sky.com"));
        assert!(domain_applies(&s, "news.sky.com"));
        assert!(!domain_applies(&s, "other.com"));
        assert!(!domain_applies(&s, "notsky.com"));
        assert!(!domain_applies(&s, ""));
    }

    #[test]
    fn test_domain_exclusion_only() {
        let s = scope(&[("example.com", false)]);
        assert!(!domain_applies(&s, "example.com"));
        assert!(!domain_applies(&s, "www.example.com"));
        assert!(domain_applies(&s, "other.com"));
        assert!(domain_applies(&s, ""));
    }

    #[test]
    fn test_domain_exclusion_beats_inclusion() {
        let s = scope(&[("example.com", true), ("ads.example.com", false)]);
        assert!(domain_applies(&s, "www.example.com"));
        assert!(!domain_applies(&s, "ads.example.com"));
        assert!(!domain_applies(&s, "x.ads.example.com"));
    }
}
