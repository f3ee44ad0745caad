//! Key derivation functions
//!
//! `hkdf_expand` — HKDF-SHA256, used to turn the X25519 shared secret of a
//!   key wrap into the wrapping key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Salt for key-wrap derivations.
const WRAP_SALT: &[u8] = b"sp-key-wrap-v1";

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive the 32-byte wrapping key for one sealed key transport.
///
/// `info` = ephemeral_pub || recipient_pub, binding the key to both ends.
pub fn derive_wrap_key(
    shared_secret: &[u8],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut info = [0u8; 64];
    info[..32].copy_from_slice(ephemeral_pub);
    info[32..].copy_from_slice(recipient_pub);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf_expand(shared_secret, Some(WRAP_SALT), &info, key.as_mut())?;
    Ok(key)
}
