//! Canonical hashing helpers for stable fingerprints and payload digests.
//!
//! Provides canonical encodings for byte fields and integers used by
//! report fingerprints, plus a short digest form used when a payload
//! mismatch would otherwise dump raw bytes into a failure message.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Hashes a byte field with an explicit length prefix.
///
/// Length-prefixing avoids delimiter ambiguities (for example embedded `|`
/// or newlines) that can otherwise make distinct data serialize to
/// identical byte streams before hashing.
pub(crate) fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_be_bytes());
    hasher.update(bytes);
}

/// Hashes a fixed-width integer field.
pub(crate) fn hash_u64_field(hasher: &mut Sha256, value: u64) {
    hasher.update(value.to_be_bytes());
}

/// Base64 encoding of a finalized hash, as used by report fingerprints.
pub(crate) fn encode_digest(hasher: Sha256) -> String {
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Compact digest of a payload for failure messages: byte length plus a
/// truncated SHA-256, enough to tell two payloads apart without printing
/// either.
pub(crate) fn payload_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());
    format!("{} bytes, sha256 {}", bytes.len(), &digest[..16])
}
