//! Fingerprinting and content-addressing primitives.
//!
//! [`djb2`] drives partition selection and in-memory bucket placement; it is
//! cheap and uniform enough for load distribution but carries no collision
//! resistance. [`sha256_hex`] is used only to derive disk-tier paths, where
//! collision resistance matters to avoid aliasing distinct keys onto the same
//! leaf directory.

use sha2::{Digest, Sha256};

/// Seed used by the djb2 fingerprint, per Bernstein's original constant.
const DJB2_SEED: u32 = 5381;

/// Computes the 32-bit djb2 fingerprint of `key`.
pub fn djb2(key: &[u8]) -> u32 {
    let mut hash = DJB2_SEED;
    for &byte in key {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u32);
    }
    hash
}

/// Computes the lowercase hex-encoded SHA-256 digest of `key`.
pub fn sha256_hex(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hex::encode(hasher.finalize())
}

/// Selects the partition index for `key` out of `partitions` total partitions.
///
/// Panics if `partitions` is zero; callers are expected to enforce `1..=64`
/// at configuration time.
pub fn partition_index(key: &[u8], partitions: usize) -> usize {
    debug_assert!(partitions > 0, "partition count must be positive");
    (djb2(key) as usize) % partitions
}

/// Selects the bucket index for `key` out of `bucket_count` buckets.
///
/// `bucket_count` must be a power of two; callers derive it via
/// [`crate::memory::bucket_count_for_capacity`].
pub fn bucket_index(key: &[u8], bucket_count: usize) -> usize {
    debug_assert!(bucket_count.is_power_of_two());
    (djb2(key) as usize) & (bucket_count - 1)
}
