//! Sealed key transport
//!
//! A symmetric key is sealed to a recipient's identity key so only the
//! holder of the matching private key can recover it.
//!
//! Seal (sender):
//!   1. ephemeral ← X25519.generate()
//!   2. recipient_x25519 ← Ed25519 public → Montgomery
//!   3. shared ← ECDH(ephemeral, recipient_x25519)
//!   4. wrap_key ← HKDF-SHA256(shared, salt="sp-key-wrap-v1",
//!                             info = ephemeral_pub || recipient_x25519)
//!   5. sealed ← XChaCha20-Poly1305(wrap_key, payload, aad="sp-key-wrap")
//!
//! Wire format:
//!   [ ephemeral_pub (32) | nonce (24) | ciphertext + tag ]

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::Zeroizing;

use crate::{
    aead,
    error::CryptoError,
    identity::{IdentityKeyPair, PublicKeyBytes},
    kdf,
};

const WRAP_AAD: &[u8] = b"sp-key-wrap";
const EPHEMERAL_LEN: usize = 32;

/// Seal `payload` to the owner of `recipient`.
pub fn seal(payload: &[u8], recipient: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError> {
    let recipient_x = recipient.to_x25519()?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient_x);
    if !shared.was_contributory() {
        return Err(CryptoError::KeyWrap("non-contributory key exchange".into()));
    }

    let wrap_key = kdf::derive_wrap_key(
        shared.as_bytes(),
        ephemeral_pub.as_bytes(),
        recipient_x.as_bytes(),
    )?;
    let sealed = aead::encrypt(&wrap_key, payload, WRAP_AAD)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + sealed.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a sealed payload with our own identity key.
///
/// Every failure collapses to `KeyUnwrap`: a caller cannot distinguish
/// "not addressed to me" from "corrupted".
pub fn open(sealed: &[u8], own: &IdentityKeyPair) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < EPHEMERAL_LEN {
        return Err(CryptoError::KeyUnwrap);
    }
    let (eph_bytes, body) = sealed.split_at(EPHEMERAL_LEN);
    let eph: [u8; 32] = eph_bytes.try_into().map_err(|_| CryptoError::KeyUnwrap)?;
    let ephemeral_pub = X25519Public::from(eph);

    let own_secret = own.to_x25519_secret();
    let own_x = X25519Public::from(&own_secret);
    let shared = own_secret.diffie_hellman(&ephemeral_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::KeyUnwrap);
    }

    let wrap_key =
        kdf::derive_wrap_key(shared.as_bytes(), ephemeral_pub.as_bytes(), own_x.as_bytes())
            .map_err(|_| CryptoError::KeyUnwrap)?;
    aead::decrypt(&wrap_key, body, WRAP_AAD).map_err(|_| CryptoError::KeyUnwrap)
}
