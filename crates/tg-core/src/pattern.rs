//! URL pattern parsing and matching
//!
//! Grammar: an optional `||` hostname anchor, then text where `*` matches any
//! run of characters, `^` matches one separator (`/`, `?`, `:`) or the end of
//! the URL, and `\$` is a literal dollar. Everything else is literal.
//!
//! The pattern body is split at wildcards into pieces. Pieces are matched in
//! order, each at its leftmost occurrence after the previous one. Patterns
//! carry no end anchor, so the leftmost choice never has to be revisited.

use std::fmt;

use crate::hash::hash_token;
use crate::psl::is_same_or_subdomain;
use crate::url::{get_host_position, get_scheme_end, is_separator_char, MIN_TOKEN_LEN};

/// Error produced when a pattern is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("pattern has no literal text, only wildcards and separators")]
    NoLiteral,
    #[error("`||` anchor without a hostname")]
    EmptyHost,
    #[error("invalid hostname `{0}` after `||`")]
    InvalidHost(String),
    #[error("wildcard inside hostname `{0}` after `||`")]
    WildcardInHost(String),
    #[error("unsupported `|` anchor at byte {0}")]
    StrayAnchor(usize),
}

/// One lexical element of a pattern body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternToken {
    Literal(String),
    /// `*`
    Wildcard,
    /// `^`
    Separator,
}

/// Shape of a pattern, for diagnostics and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Literal text matched anywhere in the URL.
    Plain,
    /// `||host...`
    HostAnchored,
    /// Unanchored text with at least one `*`.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PieceItem {
    Literal(Box<[u8]>),
    Separator,
}

/// Wildcard-free run of literals and separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Piece {
    items: Vec<PieceItem>,
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    /// Lowercased anchor host for `||` patterns.
    host: Option<String>,
    /// Body tokens after the anchor host, with runs of `*` collapsed.
    body: Vec<PatternToken>,
    pieces: Vec<Piece>,
    /// Host-anchored body starts with `*`: the first piece may float.
    floating_start: bool,
}

impl Pattern {
    /// Parse the pattern part of a rule line (everything before the options).
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }

        let (host, body_text, body_offset) = match text.strip_prefix("||") {
            Some(rest) => {
                let trimmed = rest.trim_start_matches('.');
                let lead = rest.len() - trimmed.len();
                let host_len = trimmed
                    .find(|c| matches!(c, '^' | '/' | '*' | '?' | ':'))
                    .unwrap_or(trimmed.len());
                let host = &trimmed[..host_len];
                if host.is_empty() {
                    return Err(PatternError::EmptyHost);
                }
                if !is_valid_host(host) {
                    return Err(PatternError::InvalidHost(host.to_string()));
                }
                if wildcard_inside_host(host, &trimmed[host_len..]) {
                    let end = trimmed
                        .find(|c| matches!(c, '^' | '/' | '?' | ':'))
                        .unwrap_or(trimmed.len());
                    return Err(PatternError::WildcardInHost(trimmed[..end].to_string()));
                }
                (
                    Some(host.to_ascii_lowercase()),
                    &trimmed[host_len..],
                    2 + lead + host_len,
                )
            }
            None => (None, text, 0),
        };

        let body = lex_body(body_text, body_offset)?;
        if host.is_none() && !body.iter().any(|t| matches!(t, PatternToken::Literal(_))) {
            return Err(PatternError::NoLiteral);
        }

        Ok(Self::from_parts(host, body))
    }

    fn from_parts(host: Option<String>, body: Vec<PatternToken>) -> Self {
        let floating_start = matches!(body.first(), Some(PatternToken::Wildcard));
        let mut pieces = Vec::new();
        let mut current = Vec::new();
        for token in &body {
            match token {
                PatternToken::Wildcard => {
                    if !current.is_empty() {
                        pieces.push(Piece { items: std::mem::take(&mut current) });
                    }
                }
                PatternToken::Separator => current.push(PieceItem::Separator),
                PatternToken::Literal(s) => {
                    current.push(PieceItem::Literal(s.as_bytes().to_vec().into_boxed_slice()))
                }
            }
        }
        if !current.is_empty() {
            pieces.push(Piece { items: current });
        }

        Self {
            host,
            body,
            pieces,
            floating_start,
        }
    }

    /// Anchor host of a `||` pattern, lowercased.
    #[inline]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Body tokens after the anchor host.
    #[inline]
    pub fn tokens(&self) -> &[PatternToken] {
        &self.body
    }

    pub fn kind(&self) -> PatternKind {
        if self.host.is_some() {
            PatternKind::HostAnchored
        } else if self.body.contains(&PatternToken::Wildcard) {
            PatternKind::Wildcard
        } else {
            PatternKind::Plain
        }
    }

    /// Match against a URL, locating its host first.
    pub fn matches(&self, url: &str) -> bool {
        self.matches_with_host(url, get_host_position(url))
    }

    /// Match against a URL whose host span has already been located.
    ///
    /// Scheme and host bytes compare case-insensitively; the rest of the URL
    /// is case-sensitive.
    pub fn matches_with_host(&self, url: &str, host: Option<(usize, usize)>) -> bool {
        let bytes = url.as_bytes();
        let fold_end = match host {
            Some((_, end)) => end,
            None => get_scheme_end(url).unwrap_or(0),
        };

        let mut pieces = self.pieces.iter();
        let mut pos = 0;

        if let Some(anchor) = &self.host {
            let (host_start, host_end) = match host {
                Some(span) => span,
                None => return false,
            };
            if !is_same_or_subdomain(&url[host_start..host_end], anchor) {
                return false;
            }
            pos = host_end;
            if !self.floating_start {
                if let Some(first) = pieces.next() {
                    match piece_at(first, bytes, pos, fold_end) {
                        Some(end) => pos = end,
                        None => return false,
                    }
                }
            }
        }

        for piece in pieces {
            match find_piece(piece, bytes, pos, fold_end) {
                Some(end) => pos = end,
                None => return false,
            }
        }

        true
    }

    /// Hashes of the alphanumeric runs that any matching URL must contain as
    /// a whole token. Empty for `||` patterns, which are indexed by host.
    pub fn index_tokens(&self) -> Vec<u32> {
        let mut out = Vec::new();
        if self.host.is_some() {
            return out;
        }
        for piece in &self.pieces {
            piece_tokens(piece, &mut out);
        }
        out
    }
}

/// Canonical pattern text: parsing it yields an equal pattern.
impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "||{host}")?;
        }
        for token in &self.body {
            match token {
                PatternToken::Wildcard => f.write_str("*")?,
                PatternToken::Separator => f.write_str("^")?,
                PatternToken::Literal(s) => f.write_str(&s.replace('$', "\\$"))?,
            }
        }
        Ok(())
    }
}

fn is_valid_host(host: &str) -> bool {
    !host.ends_with('.')
        && !host.contains("..")
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}

/// `*` right after the anchor host continues the hostname when the host is a
/// single label (`||ads*`) or the wildcard is followed by `.` or `-`
/// (`||ads*.example.com`). Such patterns are rejected.
fn wildcard_inside_host(host: &str, rest: &str) -> bool {
    let after = match rest.strip_prefix('*') {
        Some(after) => after.trim_start_matches('*'),
        None => return false,
    };
    !host.contains('.') || after.starts_with(['.', '-'])
}

fn lex_body(text: &str, offset: usize) -> Result<Vec<PatternToken>, PatternError> {
    let mut tokens: Vec<PatternToken> = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '*' | '^' => {
                if !literal.is_empty() {
                    tokens.push(PatternToken::Literal(std::mem::take(&mut literal)));
                }
                if c == '^' {
                    tokens.push(PatternToken::Separator);
                } else if tokens.last() != Some(&PatternToken::Wildcard) {
                    tokens.push(PatternToken::Wildcard);
                }
            }
            '|' => return Err(PatternError::StrayAnchor(offset + i)),
            '\\' if matches!(chars.peek(), Some((_, '$'))) => {
                chars.next();
                literal.push('$');
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        tokens.push(PatternToken::Literal(literal));
    }

    // A trailing `*` adds nothing to an unanchored-end match.
    if tokens.last() == Some(&PatternToken::Wildcard) {
        tokens.pop();
    }
    Ok(tokens)
}

/// End position if `piece` matches exactly at `pos`.
fn piece_at(piece: &Piece, url: &[u8], mut pos: usize, fold_end: usize) -> Option<usize> {
    for item in &piece.items {
        match item {
            PieceItem::Literal(lit) => {
                let end = pos + lit.len();
                if end > url.len() || !literal_eq(&url[pos..end], lit, pos, fold_end) {
                    return None;
                }
                pos = end;
            }
            PieceItem::Separator => {
                if pos < url.len() {
                    if !is_separator_char(url[pos]) {
                        return None;
                    }
                    pos += 1;
                }
            }
        }
    }
    Some(pos)
}

/// End position of the leftmost occurrence of `piece` at or after `from`.
fn find_piece(piece: &Piece, url: &[u8], from: usize, fold_end: usize) -> Option<usize> {
    let first = match piece.items.first() {
        Some(PieceItem::Literal(lit)) => Some(lit[0]),
        _ => None,
    };
    (from..=url.len()).find_map(|start| {
        if let Some(b) = first {
            let c = *url.get(start)?;
            let same = if start < fold_end { c.eq_ignore_ascii_case(&b) } else { c == b };
            if !same {
                return None;
            }
        }
        piece_at(piece, url, start, fold_end)
    })
}

#[inline]
fn literal_eq(hay: &[u8], lit: &[u8], start: usize, fold_end: usize) -> bool {
    if start >= fold_end {
        return hay == lit;
    }
    let folded = (fold_end - start).min(lit.len());
    hay[..folded].eq_ignore_ascii_case(&lit[..folded]) && hay[folded..] == lit[folded..]
}

/// Tokens fully enclosed by non-alphanumeric pattern bytes inside one piece.
fn piece_tokens(piece: &Piece, out: &mut Vec<u32>) {
    // Flatten to bytes, with separators as a non-alphanumeric marker.
    let mut flat: Vec<u8> = Vec::new();
    for item in &piece.items {
        match item {
            PieceItem::Literal(lit) => flat.extend_from_slice(lit),
            PieceItem::Separator => flat.push(b'/'),
        }
    }

    let mut start = None;
    for i in 0..=flat.len() {
        let alnum = i < flat.len() && flat[i].is_ascii_alphanumeric();
        if alnum {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            let bounded = s > 0 && i < flat.len();
            if bounded && i - s >= MIN_TOKEN_LEN {
                let hash = hash_token(&flat[s..i]);
                if !out.contains(&hash) {
                    out.push(hash);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(text: &str) -> Pattern {
        Pattern::parse(text).expect("pattern should parse")
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(pat("/ads/banner").kind(), PatternKind::Plain);
        assert_eq!(pat("||ntv.io^").kind(), PatternKind::HostAnchored);
        assert_eq!(pat("/ads/*/banner").kind(), PatternKind::Wildcard);
        assert_eq!(pat("||NTV.io^").host(), Some("ntv.io"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Pattern::parse(""), Err(PatternError::Empty));
        assert_eq!(Pattern::parse("*^*"), Err(PatternError::NoLiteral));
        assert_eq!(Pattern::parse("||"), Err(PatternError::EmptyHost));
        assert_eq!(Pattern::parse("||^"), Err(PatternError::EmptyHost));
        assert_eq!(Pattern::parse("||*.js"), Err(PatternError::EmptyHost));
        assert_eq!(Pattern::parse("||ads..com^"), Err(PatternError::InvalidHost("ads..com".into())));
        assert_eq!(Pattern::parse("/ads.js|"), Err(PatternError::StrayAnchor(7)));
        assert_eq!(
            Pattern::parse("||ads*.example.com^"),
            Err(PatternError::WildcardInHost("ads*.example.com".into()))
        );
        assert_eq!(
            Pattern::parse("||cdn.ads*-tracker.net/x"),
            Err(PatternError::WildcardInHost("cdn.ads*-tracker.net".into()))
        );
        assert_eq!(Pattern::parse("||ads*/banner"), Err(PatternError::WildcardInHost("ads*".into())));
        assert_eq!(Pattern::parse("|https://ads"), Err(PatternError::StrayAnchor(0)));
    }

    #[test]
    fn test_host_anchor_label_boundary() {
        let p = pat("||ntv.io^");
        assert!(p.matches("https://ntv.io/x.js"));
        assert!(p.matches("https://cdn.ntv.io/x.js"));
        assert!(p.matches("https://NTV.IO:443/x.js"));
        assert!(p.matches("https://ntv.io"));
        assert!(!p.matches("https://notntv.io/x.js"));
        assert!(!p.matches("https://ntv.io.evil.com/x.js"));
        assert!(!p.matches("https://example.com/?u=ntv.io"));
    }

    #[test]
    fn test_host_anchor_with_path() {
        let p = pat("||example.com/ads/");
        assert!(p.matches("https://example.com/ads/1.png"));
        assert!(!p.matches("https://example.com/x/ads/1.png"));

        let p = pat("||adm.fwmrm.net^*/AdManager.js");
        assert!(p.matches("https://adm.fwmrm.net/foo/AdManager.js"));
        // `^` consumes the only slash, leaving none for the literal.
        assert!(!p.matches("https://adm.fwmrm.net/AdManager.js"));
        assert!(!p.matches("https://adm.fwmrm.net/foo/admanager.js"));
        assert!(!p.matches("https://other.net/foo/AdManager.js"));
    }

    #[test]
    fn test_wildcard_after_complete_host() {
        let p = pat("||example.com*/ads/");
        assert_eq!(p.host(), Some("example.com"));
        assert!(p.matches("https://example.com/x/ads/1.png"));
        assert!(pat("||example.com*").matches("https://example.com/"));
    }

    #[test]
    fn test_plain_substring() {
        let p = pat("-advertisement-icon.");
        assert!(p.matches("http://example.com/-advertisement-icon."));
        assert!(!p.matches("http://example.com/-advertisement.png"));
    }

    #[test]
    fn test_case_sensitivity_by_region() {
        let p = pat("Example.COM/Ads");
        assert!(p.matches("https://example.com/Ads"));
        assert!(!p.matches("https://example.com/ads"));
    }

    #[test]
    fn test_wildcards_leftmost() {
        let p = pat("/ads/*/banner*.gif");
        assert!(p.matches("https://x.com/ads/top/banner-1.gif"));
        assert!(p.matches("https://x.com/ads//banner.gif"));
        assert!(!p.matches("https://x.com/ads/banner.gif"));
        assert!(!p.matches("https://x.com/banner/ads/x.gif"));
    }

    #[test]
    fn test_separator() {
        let p = pat("/track^");
        assert!(p.matches("https://x.com/track"));
        assert!(p.matches("https://x.com/track?id=1"));
        assert!(p.matches("https://x.com/track/"));
        assert!(!p.matches("https://x.com/tracker"));
        // A later occurrence can satisfy the separator.
        assert!(p.matches("https://x.com/trackers/track?x"));
    }

    #[test]
    fn test_escaped_dollar() {
        let p = pat("/price\\$100");
        assert!(p.matches("https://shop.com/price$100"));
        assert_eq!(p.to_string(), "/price\\$100");
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(pat("||.Ads.Example.com^**/x*").to_string(), "||ads.example.com^*/x");
        assert_eq!(pat("||adm.fwmrm.net^*/AdManager.js").to_string(), "||adm.fwmrm.net^*/AdManager.js");
        let p = pat("/a/*b^");
        assert_eq!(Pattern::parse(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn test_index_tokens_are_bounded() {
        // "ads" at the start may be a suffix of a longer URL token.
        let p = pat("ads/banner/");
        assert_eq!(p.index_tokens(), vec![hash_token(b"banner")]);

        let p = pat("/track^");
        assert_eq!(p.index_tokens(), vec![hash_token(b"track")]);

        assert!(pat("/ad*vert/").index_tokens().is_empty());
        assert!(pat("||ntv.io/ads/").index_tokens().is_empty());
    }
}
