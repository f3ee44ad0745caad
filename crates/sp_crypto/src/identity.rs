//! Identity key management
//!
//! Each user holds one long-term `IdentityKeyPair` (Ed25519). The same key
//! serves both roles the messenger needs:
//!   - signing: Ed25519 signatures over message ciphertext
//!   - key transport: the Ed25519 key is mapped to X25519 (Montgomery form)
//!     so symmetric keys can be sealed to it (see `wrap`)
//!
//! Public keys are exchanged as `PublicKeyBytes`, base64url-encoded on the wire.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, hash};

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// 32-byte Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Public key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short log-safe fingerprint.
    pub fn fingerprint(&self) -> String {
        hash::key_fingerprint(&self.0)
    }

    /// X25519 form of this key for sealing symmetric keys to its owner.
    pub fn to_x25519(&self) -> Result<X25519Public, CryptoError> {
        ed25519_pub_to_x25519(&self.0)
    }
}

impl Serialize for PublicKeyBytes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_b64())
    }
}

impl<'de> Deserialize<'de> for PublicKeyBytes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_b64(&s).map_err(serde::de::Error::custom)
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// Long-term identity signing key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        Self { public, secret_bytes: signing_key.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Identity key must be 32 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&arr);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        Ok(Self { public, secret_bytes: arr })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    /// Sign arbitrary bytes; returns 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing_key().sign(msg).to_bytes().to_vec()
    }

    /// Verify a signature made by any Ed25519 public key.
    pub fn verify(
        public: &PublicKeyBytes,
        msg: &[u8],
        sig_bytes: &[u8],
    ) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(&public.0)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_bytes(
            sig_bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
        );
        vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
    }

    /// X25519 static secret matching `public.to_x25519()`.
    pub fn to_x25519_secret(&self) -> StaticSecret {
        ed25519_secret_to_x25519(&self.secret_bytes)
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityKeyPair({}, [REDACTED])", self.public.fingerprint())
    }
}

// ── Ed25519 → X25519 ─────────────────────────────────────────────────────────

/// Convert an Ed25519 signing key (32 bytes) to an X25519 static secret.
/// Uses the clamped SHA-512 expansion that ed25519-dalek uses internally.
pub fn ed25519_secret_to_x25519(ed_secret: &[u8; 32]) -> StaticSecret {
    use sha2::{Digest, Sha512};
    let mut h = Sha512::digest(ed_secret);
    // Clamp as per RFC 7748 §5
    h[0] &= 248;
    h[31] &= 127;
    h[31] |= 64;
    let mut key = [0u8; 32];
    key.copy_from_slice(&h[..32]);
    h.as_mut_slice().zeroize();
    let secret = StaticSecret::from(key);
    key.zeroize();
    secret
}

/// Convert an Ed25519 verifying key (public, 32 bytes) to an X25519 public key.
/// Uses the birational map from the Ed25519 curve to Curve25519.
pub fn ed25519_pub_to_x25519(ed_pub: &[u8; 32]) -> Result<X25519Public, CryptoError> {
    use curve25519_dalek::edwards::CompressedEdwardsY;
    let compressed = CompressedEdwardsY::from_slice(ed_pub)
        .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 public key".into()))?;
    let point = compressed.decompress().ok_or_else(|| {
        CryptoError::InvalidKey("Ed25519 public key decompression failed".into())
    })?;
    Ok(X25519Public::from(point.to_montgomery().to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = IdentityKeyPair::generate();
        let sig = kp.sign(b"ciphertext");
        assert_eq!(sig.len(), 64);
        IdentityKeyPair::verify(&kp.public, b"ciphertext", &sig).unwrap();
        assert!(matches!(
            IdentityKeyPair::verify(&kp.public, b"ciphertexT", &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn verify_rejects_malformed_signature() {
        let kp = IdentityKeyPair::generate();
        assert!(matches!(
            IdentityKeyPair::verify(&kp.public, b"m", &[0u8; 10]),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn x25519_conversion_agrees_on_both_halves() {
        let kp = IdentityKeyPair::generate();
        let from_secret = X25519Public::from(&kp.to_x25519_secret());
        let from_public = kp.public.to_x25519().unwrap();
        assert_eq!(from_secret.as_bytes(), from_public.as_bytes());
    }

    #[test]
    fn from_bytes_restores_same_public_key() {
        let kp = IdentityKeyPair::generate();
        let restored = IdentityKeyPair::from_bytes(kp.secret_bytes()).unwrap();
        assert_eq!(kp.public, restored.public);
        assert!(IdentityKeyPair::from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn public_key_b64_roundtrip() {
        let kp = IdentityKeyPair::generate();
        let encoded = serde_json::to_string(&kp.public).unwrap();
        let decoded: PublicKeyBytes = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, kp.public);
        assert!(PublicKeyBytes::from_b64("AAAA").is_err());
    }
}
