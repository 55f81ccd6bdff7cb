//! Fast URL helpers for the hot path
//!
//! These functions avoid allocations and work directly on string slices.

use crate::hash::hash_token;

/// Minimum length of an alphanumeric run to count as an index token.
pub const MIN_TOKEN_LEN: usize = 3;

// =============================================================================
// Scheme / Host
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    // Scheme must be non-empty and contain no path characters
    if colon_pos == 0 || bytes[..colon_pos].iter().any(|&b| b == b'/' || b == b'?') {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

/// Get the start and end positions of the hostname in a URL.
///
/// Userinfo is skipped; the port is excluded. IPv6 literals keep their brackets.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' || b == b'?' || b == b'#' {
            break;
        }
    }

    let mut host_end = bytes.len();
    let mut in_brackets = false;
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        match b {
            b'[' => in_brackets = true,
            b']' => in_brackets = false,
            b':' if !in_brackets => {
                host_end = i;
                break;
            }
            b'/' | b'?' | b'#' => {
                host_end = i;
                break;
            }
            _ => {}
        }
    }

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    let host = &url[host_start..host_end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

// =============================================================================
// Separator Check
// =============================================================================

/// Characters a `^` placeholder accepts: `/`, `?` and `:`.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    matches!(c, b'/' | b'?' | b':')
}

// =============================================================================
// URL Tokenization
// =============================================================================

/// Tokenize a URL for the token buckets.
///
/// Returns the deduplicated, case-folded hashes of every alphanumeric run of
/// at least [`MIN_TOKEN_LEN`] bytes.
pub fn tokenize_url(url: &str) -> Vec<u32> {
    let mut tokens = Vec::with_capacity(16);
    for_each_token(url.as_bytes(), |token| {
        let hash = hash_token(token);
        if !tokens.contains(&hash) {
            tokens.push(hash);
        }
    });
    tokens
}

/// Call `f` with every alphanumeric run of at least [`MIN_TOKEN_LEN`] bytes.
pub fn for_each_token(bytes: &[u8], mut f: impl FnMut(&[u8])) {
    let mut token_start = None;
    for i in 0..=bytes.len() {
        let is_alnum = i < bytes.len() && bytes[i].is_ascii_alphanumeric();
        if is_alnum {
            if token_start.is_none() {
                token_start = Some(i);
            }
        } else if let Some(start) = token_start.take() {
            if i - start >= MIN_TOKEN_LEN {
                f(&bytes[start..i]);
            }
        }
    }
}
