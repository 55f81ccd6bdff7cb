//! Filter list parser
//!
//! Turns rule text into [`Rule`]s. Each line is parsed on its own; a bad line
//! is reported and skipped without affecting its neighbours.

use tg_core::pattern::{Pattern, PatternError};
use tg_core::types::{
    DomainEntry, DomainScope, PartyMask, RequestType, Rule, RuleKind, RuleOptions,
};

use crate::diagnostics::Diagnostic;

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorReason {
    #[error("unknown option `{0}=`")]
    UnknownOptionKey(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("`domain=` lists no domains")]
    EmptyDomainList,
    #[error("invalid domain `{0}` in `domain=`")]
    InvalidDomain(String),
    #[error("empty `tag=`")]
    EmptyTag,
    #[error("invalid tag `{0}`")]
    InvalidTag(String),
    #[error("options exclude every request type")]
    NoRequestTypes,
    #[error("options exclude both first- and third-party requests")]
    NoParty,
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A rejected line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub reason: ParseErrorReason,
}

/// Option that was recognized but has no effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOption {
    pub name: String,
    pub reason: &'static str,
}

/// What a single line turned into.
#[derive(Debug, Clone)]
pub enum ParsedLine {
    /// Blank line, comment or list header.
    Skip,
    /// Element hiding or scriptlet syntax.
    Unsupported,
    Rule {
        rule: Rule,
        ignored: Vec<IgnoredOption>,
    },
}

/// Rules and diagnostics from one list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub rules: Vec<Rule>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a whole list. Never fails; bad lines become diagnostics.
pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim();
        match parse_line(line, line_no) {
            Ok(ParsedLine::Skip) => {}
            Ok(ParsedLine::Unsupported) => {
                parsed.diagnostics.push(Diagnostic::unsupported_syntax(line_no, line));
            }
            Ok(ParsedLine::Rule { rule, ignored }) => {
                for option in &ignored {
                    parsed
                        .diagnostics
                        .push(Diagnostic::ignored_option(line_no, option, line));
                }
                parsed.rules.push(rule);
            }
            Err(error) => {
                log::trace!("skipping line {line_no}: {}", error.reason);
                parsed.diagnostics.push(Diagnostic::parse_error(&error, line));
            }
        }
    }

    parsed
}

/// Parse one line. `line_no` is only used for the error.
pub fn parse_line(line: &str, line_no: usize) -> Result<ParsedLine, ParseError> {
    let line = line.trim();
    if line.is_empty() || is_comment_line(line) {
        return Ok(ParsedLine::Skip);
    }
    if is_element_hiding_line(line) {
        return Ok(ParsedLine::Unsupported);
    }
    if line.starts_with('#') {
        return Ok(ParsedLine::Skip);
    }

    parse_rule_with_warnings(line)
        .map(|(rule, ignored)| ParsedLine::Rule { rule, ignored })
        .map_err(|reason| ParseError { line: line_no, reason })
}

/// Parse a single rule line, discarding warnings.
pub fn parse_rule(line: &str) -> Result<Rule, ParseErrorReason> {
    parse_rule_with_warnings(line.trim()).map(|(rule, _)| rule)
}

fn parse_rule_with_warnings(line: &str) -> Result<(Rule, Vec<IgnoredOption>), ParseErrorReason> {
    let (is_exception, body) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let (pattern_part, options_text) = split_rule_options(body);
    let mut options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };
    let pattern = Pattern::parse(pattern_part)?;

    let kind = if is_exception {
        if options.important {
            options.ignored.push(IgnoredOption {
                name: "important".to_string(),
                reason: "only block rules can be important",
            });
        }
        RuleKind::Exception
    } else {
        RuleKind::Block {
            important: options.important,
        }
    };

    let rule = Rule::new(kind, pattern, options.rule_options, line);
    Ok((rule, options.ignored))
}

#[derive(Default)]
struct ParsedOptions {
    rule_options: RuleOptions,
    important: bool,
    ignored: Vec<IgnoredOption>,
}

/// Split at the last `$` not escaped as `\$`.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let split = line
        .rmatch_indices('$')
        .map(|(pos, _)| pos)
        .find(|&pos| pos == 0 || bytes[pos - 1] != b'\\');
    match split {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "match-case",
    "popup",
    "collapse",
    "elemhide",
    "generichide",
    "genericblock",
];

const UNSUPPORTED_KEYS: &[&str] = &["redirect", "redirect-rule"];

fn parse_options(text: &str) -> Result<ParsedOptions, ParseErrorReason> {
    let mut parsed = ParsedOptions::default();
    let mut type_include = 0u16;
    let mut type_exclude = 0u16;
    let mut party_include = 0u8;
    let mut party_exclude = 0u8;
    let mut domains: Option<DomainScope> = None;

    for raw in text.trim().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        if let Some((key, value)) = raw.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            match key.as_str() {
                "domain" => {
                    let parsed_scope = parse_domain_option(value)?;
                    domains = Some(merge_scopes(domains, parsed_scope));
                }
                "tag" => parsed.rule_options.tag = Some(parse_tag(value)?),
                k if UNSUPPORTED_KEYS.contains(&k) => parsed.ignored.push(IgnoredOption {
                    name: format!("{k}="),
                    reason: "redirects are not supported",
                }),
                _ => return Err(ParseErrorReason::UnknownOptionKey(key)),
            }
            continue;
        }

        let lower = raw.to_ascii_lowercase();
        let (negated, name) = match lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, lower.as_str()),
        };

        if !negated && name == "important" {
            parsed.important = true;
            continue;
        }

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        if UNSUPPORTED_KEYWORDS.contains(&name) {
            parsed.ignored.push(IgnoredOption {
                name: raw.to_string(),
                reason: "not supported by the network filter",
            });
            continue;
        }

        return Err(ParseErrorReason::UnknownOption(raw.to_string()));
    }

    let type_bits = finalize_mask_u16(type_include, type_exclude, RequestType::ALL.bits())
        .ok_or(ParseErrorReason::NoRequestTypes)?;
    let party_bits = finalize_mask_u8(party_include, party_exclude, PartyMask::ALL.bits())
        .ok_or(ParseErrorReason::NoParty)?;

    parsed.rule_options.resource_types = RequestType::from_bits_truncate(type_bits);
    parsed.rule_options.party = PartyMask::from_bits_truncate(party_bits);
    parsed.rule_options.domains = domains.unwrap_or_default();
    Ok(parsed)
}

fn merge_scopes(existing: Option<DomainScope>, incoming: DomainScope) -> DomainScope {
    match existing {
        Some(mut current) => {
            for entry in incoming.entries {
                if !current.entries.contains(&entry) {
                    current.entries.push(entry);
                }
            }
            current
        }
        None => incoming,
    }
}

fn parse_domain_option(value: &str) -> Result<DomainScope, ParseErrorReason> {
    let mut entries: Vec<DomainEntry> = Vec::new();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (excluded, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain =
            normalize_domain(domain_raw).ok_or_else(|| ParseErrorReason::InvalidDomain(raw.to_string()))?;
        let entry = DomainEntry {
            domain,
            included: !excluded,
        };
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    if entries.is_empty() {
        return Err(ParseErrorReason::EmptyDomainList);
    }

    Ok(DomainScope { entries })
}

fn parse_tag(value: &str) -> Result<String, ParseErrorReason> {
    let tag = value.trim();
    if tag.is_empty() {
        return Err(ParseErrorReason::EmptyTag);
    }
    if !tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
    {
        return Err(ParseErrorReason::InvalidTag(tag.to_string()));
    }
    Ok(tag.to_string())
}

fn finalize_mask_u16(include: u16, exclude: u16, all: u16) -> Option<u16> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn finalize_mask_u8(include: u8, exclude: u8, all: u8) -> Option<u8> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn request_type_mask(name: &str) -> Option<u16> {
    match name {
        "script" => Some(RequestType::SCRIPT.bits()),
        "image" => Some(RequestType::IMAGE.bits()),
        "stylesheet" | "css" => Some(RequestType::STYLESHEET.bits()),
        "object" => Some(RequestType::OBJECT.bits()),
        "subdocument" | "frame" => Some(RequestType::SUBDOCUMENT.bits()),
        "document" => Some(RequestType::DOCUMENT.bits()),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST.bits()),
        "media" => Some(RequestType::MEDIA.bits()),
        "font" => Some(RequestType::FONT.bits()),
        "ping" => Some(RequestType::PING.bits()),
        "websocket" => Some(RequestType::WEBSOCKET.bits()),
        "other" => Some(RequestType::OTHER.bits()),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<u8> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY.bits()),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY.bits()),
        _ => None,
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

fn is_element_hiding_line(line: &str) -> bool {
    line.contains("##") || line.contains("#@#") || line.contains("#?#") || line.contains("#$#")
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() || trimmed.contains("..") {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}
