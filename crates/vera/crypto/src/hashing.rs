//! Canonical hashing for the governance ledger.
//!
//! All digests are domain-separated BLAKE3 over fixed byte layouts. The
//! bytes that get hashed (and signed) never depend on a human-readable
//! serialization: integers are little-endian, hashes are raw 32-byte
//! values, and payloads are canonical JSON bytes (`serde_json` maps are
//! key-ordered, so re-serializing the same value yields the same bytes).

use serde_json::Value;
use vera_types::ContentHash;

/// Algorithm tag recorded in key references and exported documents.
pub const ED25519_ALGORITHM: &str = "ed25519";

const DOMAIN_ENTRY: &[u8] = b"vera-ledger-entry-v1:";
const DOMAIN_BUNDLE: &[u8] = b"vera-proof-bundle-v1:";

/// Hash the canonical serialization of a ledger payload.
pub fn payload_hash(payload: &Value) -> Result<ContentHash, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(digest_bytes(&bytes))
}

/// Compute an entry hash: `H(sequence ‖ prev_hash ‖ payload_hash)`.
pub fn entry_hash(sequence: u64, prev_hash: &ContentHash, payload_hash: &ContentHash) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_ENTRY);
    hasher.update(&sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(payload_hash.as_bytes());
    ContentHash(*hasher.finalize().as_bytes())
}

/// Compute a bundle root hash over entry hashes in ledger order.
pub fn root_hash<'a>(entry_hashes: impl IntoIterator<Item = &'a ContentHash>) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_BUNDLE);
    for hash in entry_hashes {
        hasher.update(hash.as_bytes());
    }
    ContentHash(*hasher.finalize().as_bytes())
}

/// Plain BLAKE3 digest of raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash(*blake3::hash(bytes).as_bytes())
}
