//! Content blocker export
//!
//! Converts compiled rules into the JSON rule format read by WebKit content
//! blockers (Safari on iOS and macOS). Each rule becomes a trigger, made of a
//! `url-filter` regex plus domain, party and resource-type conditions, and an
//! action (`block` or `ignore-previous-rules`).
//!
//! Content blockers apply rules in array order, and `ignore-previous-rules`
//! only cancels rules that came before it. [`export_rules`] therefore emits
//! plain blocks, then exceptions, then important blocks, which gives the same
//! precedence as the matcher.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tg_core::pattern::PatternToken;
use tg_core::types::{PartyMask, RequestType, Rule, RuleKind, REQUEST_TYPE_OPTIONS};

/// One content blocker rule.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CbRule {
    pub trigger: CbTrigger,
    pub action: CbAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CbAction {
    #[serde(rename = "type")]
    pub kind: CbActionType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CbActionType {
    /// Stop loading the resource.
    Block,
    /// Cancel actions triggered by earlier rules.
    IgnorePreviousRules,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CbLoadType {
    FirstParty,
    ThirdParty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CbResourceType {
    Document,
    Image,
    StyleSheet,
    Script,
    Font,
    Raw,
    Media,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CbTrigger {
    /// Regex searched in the request URL.
    pub url_filter: String,
    /// Content blockers compare case-insensitively unless this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter_is_case_sensitive: Option<bool>,
    /// Page domains the rule is limited to; `*` prefix covers subdomains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_domain: Option<Vec<String>>,
    /// Page domains the rule never applies on. Exclusive with `if_domain`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_domain: Option<Vec<String>>,
    /// `None` matches every resource type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<BTreeSet<CbResourceType>>,
    /// Empty matches first- and third-party loads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_type: Vec<CbLoadType>,
}

/// Why a rule has no content blocker form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CbConversionError {
    #[error("`domain=` mixes included and excluded domains")]
    MixedDomainScope,
    #[error("no content blocker resource type for `{0}`")]
    NoSupportedResourceTypes(String),
}

/// Request types with a content blocker counterpart. Both frame kinds are
/// `document` there.
const RESOURCE_TYPES: &[(RequestType, CbResourceType)] = &[
    (RequestType::DOCUMENT, CbResourceType::Document),
    (RequestType::SUBDOCUMENT, CbResourceType::Document),
    (RequestType::IMAGE, CbResourceType::Image),
    (RequestType::STYLESHEET, CbResourceType::StyleSheet),
    (RequestType::SCRIPT, CbResourceType::Script),
    (RequestType::FONT, CbResourceType::Font),
    (RequestType::XMLHTTPREQUEST, CbResourceType::Raw),
    (RequestType::MEDIA, CbResourceType::Media),
];

/// Content blocker form of one rule.
///
/// A rule limited to `document` plus other types, with no party option, is
/// split in two: the other types as they are, and `document` restricted to
/// third-party loads so a site's own pages keep loading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CbRuleEquivalent {
    Single(CbRule),
    SplitDocument(CbRule, CbRule),
}

impl IntoIterator for CbRuleEquivalent {
    type Item = CbRule;
    type IntoIter = std::iter::Flatten<std::array::IntoIter<Option<CbRule>, 2>>;

    fn into_iter(self) -> Self::IntoIter {
        let rules = match self {
            Self::Single(rule) => [Some(rule), None],
            Self::SplitDocument(other, document) => [Some(other), Some(document)],
        };
        rules.into_iter().flatten()
    }
}

impl TryFrom<&Rule> for CbRuleEquivalent {
    type Error = CbConversionError;

    fn try_from(rule: &Rule) -> Result<Self, Self::Error> {
        let if_domain = non_empty(rule.options.domains.included().map(|d| format!("*{d}")).collect());
        let unless_domain = non_empty(rule.options.domains.excluded().map(|d| format!("*{d}")).collect());
        if if_domain.is_some() && unless_domain.is_some() {
            return Err(CbConversionError::MixedDomainScope);
        }

        let load_type = if rule.options.party == PartyMask::THIRD_PARTY {
            vec![CbLoadType::ThirdParty]
        } else if rule.options.party == PartyMask::FIRST_PARTY {
            vec![CbLoadType::FirstParty]
        } else {
            vec![]
        };

        let resource_type = resource_types(rule.options.resource_types)?;

        let action = CbAction {
            kind: if rule.kind.is_exception() {
                CbActionType::IgnorePreviousRules
            } else {
                CbActionType::Block
            },
        };
        let trigger = CbTrigger {
            url_filter: url_filter(rule),
            url_filter_is_case_sensitive: case_sensitive(rule).then_some(true),
            if_domain,
            unless_domain,
            resource_type,
            load_type,
        };

        if let Some(types) = &trigger.resource_type {
            if types.len() > 1 && types.contains(&CbResourceType::Document) && trigger.load_type.is_empty() {
                let mut other_types = types.clone();
                other_types.remove(&CbResourceType::Document);
                let other = CbRule {
                    trigger: CbTrigger {
                        resource_type: Some(other_types),
                        ..trigger.clone()
                    },
                    action: action.clone(),
                };
                let document = CbRule {
                    trigger: CbTrigger {
                        resource_type: Some(BTreeSet::from([CbResourceType::Document])),
                        load_type: vec![CbLoadType::ThirdParty],
                        ..trigger
                    },
                    action,
                };
                return Ok(Self::SplitDocument(other, document));
            }
        }

        Ok(Self::Single(CbRule { trigger, action }))
    }
}

/// A rule left out of the export, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedRule {
    pub rule: Arc<Rule>,
    pub reason: CbConversionError,
}

#[derive(Debug, Clone, Default)]
pub struct ContentBlockingExport {
    pub rules: Vec<CbRule>,
    pub skipped: Vec<SkippedRule>,
}

/// Convert `rules` (in list order) into an ordered content blocker list.
pub fn export_rules(rules: &[Arc<Rule>]) -> ContentBlockingExport {
    let mut blocks = Vec::new();
    let mut exceptions = Vec::new();
    let mut important = Vec::new();
    let mut skipped = Vec::new();

    for rule in rules {
        match CbRuleEquivalent::try_from(rule.as_ref()) {
            Ok(converted) => {
                let target = match rule.kind {
                    RuleKind::Block { important: false } => &mut blocks,
                    RuleKind::Exception => &mut exceptions,
                    RuleKind::Block { important: true } => &mut important,
                };
                target.extend(converted);
            }
            Err(reason) => {
                log::debug!("not exported: {} ({})", rule.source_line, reason);
                skipped.push(SkippedRule {
                    rule: Arc::clone(rule),
                    reason,
                });
            }
        }
    }

    blocks.append(&mut exceptions);
    blocks.append(&mut important);
    ContentBlockingExport { rules: blocks, skipped }
}

fn non_empty(v: Vec<String>) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Unsupported types are dropped as long as one supported type remains.
fn resource_types(types: RequestType) -> Result<Option<BTreeSet<CbResourceType>>, CbConversionError> {
    if types.is_empty() {
        return Ok(None);
    }
    let mapped: BTreeSet<CbResourceType> = RESOURCE_TYPES
        .iter()
        .filter(|(ty, _)| types.contains(*ty))
        .map(|(_, cb)| *cb)
        .collect();
    if mapped.is_empty() {
        let names: Vec<&str> = REQUEST_TYPE_OPTIONS
            .iter()
            .filter(|(_, ty)| types.contains(*ty))
            .map(|(name, _)| *name)
            .collect();
        return Err(CbConversionError::NoSupportedResourceTypes(names.join(",")));
    }
    Ok(Some(mapped))
}

/// Regex for the pattern. A `||` host may be preceded by any subdomain; `^`
/// becomes a separator class, or "separator or end" when it closes the
/// pattern.
fn url_filter(rule: &Rule) -> String {
    let pattern = &rule.pattern;
    let mut out = String::new();
    if let Some(host) = pattern.host() {
        out.push_str("^[^:]+:(//)?([^/]+\\.)?");
        push_escaped(&mut out, host);
    }

    let tokens = pattern.tokens();
    for (i, token) in tokens.iter().enumerate() {
        match token {
            PatternToken::Literal(text) => push_escaped(&mut out, text),
            PatternToken::Wildcard => out.push_str(".*"),
            PatternToken::Separator if i + 1 == tokens.len() => out.push_str("([/?:].*)?$"),
            PatternToken::Separator => out.push_str("[/?:]"),
        }
    }
    out
}

/// Paths compare case-sensitively in the matcher; hosts are already lowercase.
fn case_sensitive(rule: &Rule) -> bool {
    rule.pattern.tokens().iter().any(|t| match t {
        PatternToken::Literal(text) => text.bytes().any(|b| b.is_ascii_uppercase()),
        _ => false,
    })
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '.' | '+' | '?' | '^' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\' | '*') {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rule;

    fn convert(line: &str) -> Result<Vec<CbRule>, CbConversionError> {
        let rule = parse_rule(line).expect("rule under test should parse");
        CbRuleEquivalent::try_from(&rule).map(|eq| eq.into_iter().collect())
    }

    fn assert_converts(line: &str, expected: &str) {
        let expected: Vec<CbRule> = serde_json::from_str(expected).expect("expected JSON should deserialize");
        assert_eq!(convert(line).unwrap(), expected, "{line}");
    }

    #[test]
    fn test_host_anchor() {
        assert_converts(
            "||ads.example.com^",
            r#"[{
                "trigger": {
                    "url-filter": "^[^:]+:(//)?([^/]+\\.)?ads\\.example\\.com([/?:].*)?$"
                },
                "action": { "type": "block" }
            }]"#,
        );
    }

    #[test]
    fn test_exception_with_domain_and_type() {
        assert_converts(
            "@@||example.com/ads/$script,domain=news.com",
            r#"[{
                "trigger": {
                    "url-filter": "^[^:]+:(//)?([^/]+\\.)?example\\.com/ads/",
                    "if-domain": ["*news.com"],
                    "resource-type": ["script"]
                },
                "action": { "type": "ignore-previous-rules" }
            }]"#,
        );
    }

    #[test]
    fn test_wildcards_party_and_excluded_domains() {
        assert_converts(
            "/banner/*/img^$image,xmlhttprequest,third-party,domain=~example.com",
            r#"[{
                "trigger": {
                    "url-filter": "/banner/.*/img([/?:].*)?$",
                    "unless-domain": ["*example.com"],
                    "resource-type": ["image", "raw"],
                    "load-type": ["third-party"]
                },
                "action": { "type": "block" }
            }]"#,
        );
    }

    #[test]
    fn test_mid_pattern_separator_and_case() {
        assert_converts(
            "||adm.fwmrm.net^*/AdManager.js",
            r#"[{
                "trigger": {
                    "url-filter": "^[^:]+:(//)?([^/]+\\.)?adm\\.fwmrm\\.net[/?:].*/AdManager\\.js",
                    "url-filter-is-case-sensitive": true
                },
                "action": { "type": "block" }
            }]"#,
        );
    }

    #[test]
    fn test_regex_characters_are_escaped() {
        assert_converts(
            "/ad.js?v=1+2",
            r#"[{
                "trigger": { "url-filter": "/ad\\.js\\?v=1\\+2" },
                "action": { "type": "block" }
            }]"#,
        );
    }

    #[test]
    fn test_document_split() {
        assert_converts(
            "||example.com/banners/$image,subdocument",
            r#"[{
                "trigger": {
                    "url-filter": "^[^:]+:(//)?([^/]+\\.)?example\\.com/banners/",
                    "resource-type": ["image"]
                },
                "action": { "type": "block" }
            }, {
                "trigger": {
                    "url-filter": "^[^:]+:(//)?([^/]+\\.)?example\\.com/banners/",
                    "resource-type": ["document"],
                    "load-type": ["third-party"]
                },
                "action": { "type": "block" }
            }]"#,
        );
        // With a party option the rule stays whole.
        assert_eq!(convert("||example.com/banners/$image,subdocument,first-party").unwrap().len(), 1);
    }

    #[test]
    fn test_unsupported_types_dropped_when_others_remain() {
        assert_converts(
            "/pixel.gif$image,ping",
            r#"[{
                "trigger": { "url-filter": "/pixel\\.gif", "resource-type": ["image"] },
                "action": { "type": "block" }
            }]"#,
        );
    }

    #[test]
    fn test_conversion_failures() {
        assert_eq!(
            convert("/ads/$domain=news.com|~sports.news.com"),
            Err(CbConversionError::MixedDomainScope)
        );
        assert_eq!(
            convert("/ads/$ping,websocket"),
            Err(CbConversionError::NoSupportedResourceTypes("ping,websocket".to_string()))
        );
    }

    #[test]
    fn test_export_orders_by_precedence() {
        let rules: Vec<Arc<Rule>> = [
            "||ads.com^$important",
            "@@||ads.com/ok/",
            "||tracker.net^",
            "/ads/$domain=a.com|~b.a.com",
        ]
        .iter()
        .map(|line| Arc::new(parse_rule(line).unwrap()))
        .collect();

        let export = export_rules(&rules);
        let actions: Vec<CbActionType> = export.rules.iter().map(|r| r.action.kind).collect();
        assert_eq!(
            actions,
            vec![CbActionType::Block, CbActionType::IgnorePreviousRules, CbActionType::Block]
        );
        assert!(export.rules[0].trigger.url_filter.contains("tracker\\.net"));
        assert!(export.rules[2].trigger.url_filter.contains("ads\\.com"));

        assert_eq!(export.skipped.len(), 1);
        assert_eq!(export.skipped[0].rule.source_line, "/ads/$domain=a.com|~b.a.com");
        assert_eq!(export.skipped[0].reason, CbConversionError::MixedDomainScope);
    }

    #[test]
    fn test_serialized_field_names() {
        let rules = convert("||ads.com^$script,third-party").unwrap();
        let json = serde_json::to_value(&rules).unwrap();
        assert_eq!(json[0]["action"]["type"], "block");
        assert_eq!(json[0]["trigger"]["load-type"][0], "third-party");
        assert_eq!(json[0]["trigger"]["resource-type"][0], "script");
        assert!(json[0]["trigger"].get("if-domain").is_none());
    }
}
