//! Deterministic bucketing function.
//!
//! This is part of the wire contract: SDKs in other languages must
//! reproduce the same bucket for the same `(salt, subject)` pair, so the
//! algorithm is fixed and MUST NOT be tuned for performance at the expense
//! of portability. Uses the 128-bit `x64` murmur3 variant so the
//! modulo-10000 reduction has enough entropy to stay uniform.

use murmurhash3::murmurhash3_x64_128;

/// Number of buckets subjects are distributed across.
pub const BUCKET_SPACE: u32 = 10_000;

/// Maps `(salt, subject)` to an integer in `[0, 10000)`.
///
/// `seed` is `hash.seed` from configuration (default 0) and is itself
/// part of the wire contract — changing it changes every bucket
/// assignment for every subject.
pub fn bucket(seed: u32, salt: &str, subject: &str) -> u32 {
    let mut input = Vec::with_capacity(salt.len() + 1 + subject.len());
    input.extend_from_slice(salt.as_bytes());
    input.push(b':');
    input.extend_from_slice(subject.as_bytes());

    let (_high, low) = murmurhash3_x64_128(&input, seed);
    (low % BUCKET_SPACE as u64) as u32
}
