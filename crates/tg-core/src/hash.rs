//! Hash functions for the rule index
//!
//! Host buckets are keyed by a 64-bit composite of two Murmur3 passes with
//! different seeds; token buckets use a single 32-bit pass. Both hash the
//! ASCII-lowercased input, so callers never allocate a lowered copy.
//!
//! A hash hit is only a candidate: every candidate rule is verified by the
//! pattern matcher, so collisions cost time, never correctness.

/// 64-bit hash represented as two 32-bit parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash64 {
    pub lo: u32,
    pub hi: u32,
}

const SEED_LO: u32 = 0x9e3779b9;
const SEED_HI: u32 = 0x85ebca6b;
const SEED_TOKEN: u32 = 0x811c9dc5;

#[inline]
fn fold_lower(b: u8) -> u8 {
    b.to_ascii_lowercase()
}

/// Murmur3 32-bit over the ASCII-lowercased bytes of `data`.
#[inline]
pub fn murmur3_32_lower(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([
            fold_lower(chunk[0]),
            fold_lower(chunk[1]),
            fold_lower(chunk[2]),
            fold_lower(chunk[3]),
        ]);
        h ^= mix_k(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (fold_lower(b) as u32) << (8 * i);
        }
        h ^= mix_k(k);
    }

    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

#[inline]
fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593)
}

/// Hash a hostname (or host suffix) for the host buckets.
/// Case-insensitive.
#[inline]
pub fn hash_domain(domain: &str) -> Hash64 {
    let bytes = domain.as_bytes();
    Hash64 {
        lo: murmur3_32_lower(bytes, SEED_LO),
        hi: murmur3_32_lower(bytes, SEED_HI),
    }
}

/// Hash a URL or pattern token for the token buckets.
/// Case-insensitive; never returns 0.
#[inline]
pub fn hash_token(token: &[u8]) -> u32 {
    match murmur3_32_lower(token, SEED_TOKEN) {
        0 => 1,
        h => h,
    }
}
