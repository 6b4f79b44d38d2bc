//! Content-hash identifiers used as the dataset-wide deduplication key.
//!
//! Every stream (documentation scrapes, FSM extraction, synthetic
//! generation) derives record ids from the DOT text alone, so the same graph
//! found by two streams lands on the same hash suffix without coordination.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const SHORT_HASH_LEN: usize = 16;

/// Full lowercase hex SHA-256 digest of `content`.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a content-hash id: `"{prefix}-{hash16}"`, or just `hash16` when the
/// prefix is empty.
pub fn generate_id(content: &str, prefix: &str) -> String {
    let digest = content_digest(content);
    let short_hash = &digest[..SHORT_HASH_LEN];
    if prefix.is_empty() {
        short_hash.to_string()
    } else {
        format!("{prefix}-{short_hash}")
    }
}

/// Recover the hash portion of an id produced by [`generate_id`].
///
/// Splits on the first `-`, so prefixes must not contain one for the round
/// trip to hold.
pub fn extract_hash(id: &str) -> &str {
    match id.split_once('-') {
        Some((_, hash)) => hash,
        None => id,
    }
}
