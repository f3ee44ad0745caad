//! Symmetric message keys.
//!
//! A `SymmetricKey` is the per-conversation content key cached by the
//! messenger's key store. When it travels (wrapped for a recipient) it is
//! encoded as:
//!
//!   [ algorithm tag (1 byte) | key bytes (32) ]

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{aead, error::CryptoError, hash};

/// Associated data bound into every content ciphertext.
const CONTENT_AAD: &[u8] = b"sp-content-v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SymmetricAlgorithm {
    #[default]
    #[serde(rename = "xchacha20poly1305")]
    XChaCha20Poly1305,
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
}

impl SymmetricAlgorithm {
    fn tag(self) -> u8 {
        match self {
            Self::XChaCha20Poly1305 => 0x01,
            Self::Aes256Gcm => 0x02,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            0x01 => Ok(Self::XChaCha20Poly1305),
            0x02 => Ok(Self::Aes256Gcm),
            other => Err(CryptoError::UnknownAlgorithm(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::XChaCha20Poly1305 => "xchacha20poly1305",
            Self::Aes256Gcm => "aes256gcm",
        }
    }
}

impl std::str::FromStr for SymmetricAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xchacha20poly1305" | "xchacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            "aes256gcm" | "aes-256-gcm" => Ok(Self::Aes256Gcm),
            _ => Err(CryptoError::InvalidKey(format!("unknown symmetric algorithm `{s}`"))),
        }
    }
}

/// 256-bit content key. Cloning copies the secret; every copy zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[zeroize(skip)]
    algorithm: SymmetricAlgorithm,
    bytes: [u8; aead::KEY_LEN],
}

impl SymmetricKey {
    /// Fresh key from the OS CSPRNG.
    pub fn generate(algorithm: SymmetricAlgorithm) -> Self {
        let mut bytes = [0u8; aead::KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { algorithm, bytes }
    }

    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; aead::KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("symmetric key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self { algorithm, bytes: arr })
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8; aead::KEY_LEN] {
        &self.bytes
    }

    /// Short public identifier, safe to log.
    pub fn fingerprint(&self) -> String {
        hash::key_fingerprint(&self.bytes)
    }

    /// Encoding carried inside a key wrap.
    pub fn to_transport(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(1 + aead::KEY_LEN));
        out.push(self.algorithm.tag());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn from_transport(data: &[u8]) -> Result<Self, CryptoError> {
        let (tag, key) = data
            .split_first()
            .ok_or_else(|| CryptoError::InvalidKey("empty key transport".into()))?;
        Self::from_bytes(SymmetricAlgorithm::from_tag(*tag)?, key)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self.algorithm {
            SymmetricAlgorithm::XChaCha20Poly1305 => {
                aead::encrypt(&self.bytes, plaintext, CONTENT_AAD)
            }
            SymmetricAlgorithm::Aes256Gcm => {
                aead::encrypt_gcm(&self.bytes, plaintext, CONTENT_AAD)
            }
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match self.algorithm {
            SymmetricAlgorithm::XChaCha20Poly1305 => {
                aead::decrypt(&self.bytes, ciphertext, CONTENT_AAD)
            }
            SymmetricAlgorithm::Aes256Gcm => {
                aead::decrypt_gcm(&self.bytes, ciphertext, CONTENT_AAD)
            }
        }
    }
}

impl ConstantTimeEq for SymmetricKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.algorithm.tag().ct_eq(&other.algorithm.tag()) & self.bytes[..].ct_eq(&other.bytes[..])
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey({}, {}, [REDACTED])", self.algorithm.as_str(), self.fingerprint())
    }
}
