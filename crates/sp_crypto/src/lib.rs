//! sp_crypto — Sealpost cryptographic capabilities
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The messenger core only sees the capability traits in `capability`.
//!
//! # Module layout
//! - `capability` — `SymmetricCipher` / `AsymmetricCipher` traits + defaults
//! - `symmetric`  — 256-bit content keys and their transport encoding
//! - `identity`   — long-term Ed25519 identity keys, Ed25519 → X25519 mapping
//! - `wrap`       — sealed key transport (ephemeral X25519 + HKDF + AEAD)
//! - `aead`       — XChaCha20-Poly1305 / AES-256-GCM helpers
//! - `kdf`        — HKDF-SHA256
//! - `hash`       — BLAKE3 fingerprints
//! - `error`      — unified error type

pub mod aead;
pub mod capability;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod symmetric;
pub mod wrap;

pub use capability::{AeadCipher, AsymmetricCipher, IdentityCipher, SymmetricCipher};
pub use error::CryptoError;
pub use identity::{IdentityKeyPair, PublicKeyBytes};
pub use symmetric::{SymmetricAlgorithm, SymmetricKey};
