//! Capability interfaces consumed by the messenger core.
//!
//! The core never calls a primitive directly; it goes through these traits
//! so hosts can swap in hardware-backed or legacy (RSA/AES) implementations.
//! The defaults below are backed by this crate's primitives.

use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    identity::{IdentityKeyPair, PublicKeyBytes},
    symmetric::{SymmetricAlgorithm, SymmetricKey},
    wrap,
};

/// Content encryption with per-conversation symmetric keys.
pub trait SymmetricCipher: Send + Sync {
    fn generate(&self) -> Result<SymmetricKey, CryptoError>;
    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(
        &self,
        ciphertext: &[u8],
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// Public-key operations: key transport and signatures.
pub trait AsymmetricCipher: Send + Sync {
    fn wrap(&self, plaintext: &[u8], recipient: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError>;
    fn unwrap(
        &self,
        wrapped: &[u8],
        own: &IdentityKeyPair,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
    fn sign(&self, data: &[u8], own: &IdentityKeyPair) -> Result<Vec<u8>, CryptoError>;
    fn verify(&self, data: &[u8], signature: &[u8], signer: &PublicKeyBytes) -> bool;
}

/// AEAD content cipher. `algorithm` only selects what `generate` produces;
/// decryption follows the algorithm carried by the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AeadCipher {
    pub algorithm: SymmetricAlgorithm,
}

impl AeadCipher {
    pub fn new(algorithm: SymmetricAlgorithm) -> Self {
        Self { algorithm }
    }
}

impl SymmetricCipher for AeadCipher {
    fn generate(&self) -> Result<SymmetricKey, CryptoError> {
        Ok(SymmetricKey::generate(self.algorithm))
    }

    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
        key.encrypt(plaintext)
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        key.decrypt(ciphertext)
    }
}

/// Ed25519 signatures + X25519 sealed key transport over the same identity key.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCipher;

impl AsymmetricCipher for IdentityCipher {
    fn wrap(&self, plaintext: &[u8], recipient: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError> {
        wrap::seal(plaintext, recipient)
    }

    fn unwrap(
        &self,
        wrapped: &[u8],
        own: &IdentityKeyPair,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        wrap::open(wrapped, own)
    }

    fn sign(&self, data: &[u8], own: &IdentityKeyPair) -> Result<Vec<u8>, CryptoError> {
        Ok(own.sign(data))
    }

    fn verify(&self, data: &[u8], signature: &[u8], signer: &PublicKeyBytes) -> bool {
        IdentityKeyPair::verify(signer, data, signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_cipher_generates_configured_algorithm() {
        let cipher = AeadCipher::new(SymmetricAlgorithm::Aes256Gcm);
        let key = cipher.generate().unwrap();
        assert_eq!(key.algorithm(), SymmetricAlgorithm::Aes256Gcm);
        let ct = cipher.encrypt(b"body", &key).unwrap();
        assert_eq!(cipher.decrypt(&ct, &key).unwrap().as_slice(), b"body");
    }

    #[test]
    fn identity_cipher_wraps_symmetric_key() {
        let cipher = IdentityCipher;
        let bob = IdentityKeyPair::generate();
        let key = SymmetricKey::generate(SymmetricAlgorithm::default());
        let wrapped = cipher.wrap(&key.to_transport(), &bob.public).unwrap();
        let opened = cipher.unwrap(&wrapped, &bob).unwrap();
        assert_eq!(SymmetricKey::from_transport(&opened).unwrap(), key);
    }

    #[test]
    fn identity_cipher_verify_is_boolean() {
        let cipher = IdentityCipher;
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let sig = cipher.sign(b"data", &alice).unwrap();
        assert!(cipher.verify(b"data", &sig, &alice.public));
        assert!(!cipher.verify(b"data", &sig, &bob.public));
        assert!(!cipher.verify(b"data", b"short", &alice.public));
    }
}
