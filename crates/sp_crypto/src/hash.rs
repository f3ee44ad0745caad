//! BLAKE3-based hash utilities
//!
//! - Key fingerprints (log-safe identifiers for symmetric and public keys)
//! - Ciphertext digests for correlating log lines across pipeline stages

pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// 16 hex chars of a domain-separated BLAKE3 digest over key material.
/// Never reversible to the key; stable across processes.
pub fn key_fingerprint(key: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"sp-key-fp-v1\x00");
    hasher.update(key);
    hex::encode(&hasher.finalize().as_bytes()[..8])
}

/// Digest of a ciphertext, used as a message reference in logs.
pub fn ciphertext_digest(ciphertext: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"sp-ct-v1\x00");
    hasher.update(ciphertext);
    hex::encode(&hasher.finalize().as_bytes()[..12])
}
