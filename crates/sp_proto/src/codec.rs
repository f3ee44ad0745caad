//! Wire codec — canonical content bytes, padding, and base64 field helpers.
//!
//! # Plaintext framing
//! Content is serialised to canonical JSON and padded BEFORE symmetric
//! encryption, so ciphertext length only reveals the bucket:
//!
//!   [original_len: u32 LE] [canonical content] [random padding]
//!
//! Bucket sizes (bytes): 256, 512, 1024, 4096, 16384, 65536
//! Larger payloads are length-prefixed but not padded.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{content::Content, error::ProtoError};

/// Padding mode for metadata minimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingMode {
    /// Length prefix only.
    None,
    /// Pad to fixed-size buckets.
    #[default]
    Buckets,
    /// Pad everything to the largest bucket.
    Maximum,
}

impl std::str::FromStr for PaddingMode {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "buckets" => Ok(Self::Buckets),
            "maximum" => Ok(Self::Maximum),
            other => Err(ProtoError::InvalidPadding(format!("unknown padding mode `{other}`"))),
        }
    }
}

const LEN_PREFIX: usize = 4;
pub const BUCKET_SIZES: &[usize] = &[256, 512, 1024, 4096, 16384, 65536];
const MAX_BUCKET: usize = 65536;

/// Pad plaintext to the next bucket boundary.
pub fn pad_to_bucket(plaintext: &[u8], mode: PaddingMode) -> Result<Vec<u8>, ProtoError> {
    let needed = LEN_PREFIX + plaintext.len();
    let target = match mode {
        PaddingMode::None => needed,
        PaddingMode::Buckets => BUCKET_SIZES
            .iter()
            .copied()
            .find(|&b| b >= needed)
            .unwrap_or(needed),
        PaddingMode::Maximum => needed.max(MAX_BUCKET),
    };
    pad_to_size(plaintext, target)
}

/// Remove padding after decryption.
pub fn unpad(padded: &[u8]) -> Result<&[u8], ProtoError> {
    if padded.len() < LEN_PREFIX {
        return Err(ProtoError::InvalidPadding("too short for length prefix".into()));
    }
    let len = u32::from_le_bytes([padded[0], padded[1], padded[2], padded[3]]) as usize;
    if LEN_PREFIX + len > padded.len() {
        return Err(ProtoError::InvalidPadding(format!(
            "length prefix {len} exceeds padded data size {}",
            padded.len()
        )));
    }
    Ok(&padded[LEN_PREFIX..LEN_PREFIX + len])
}

/// Length prefix for `len` plaintext bytes; must fit in a `u32`.
fn frame_len(len: usize) -> Result<u32, ProtoError> {
    u32::try_from(len).map_err(|_| {
        ProtoError::InvalidPadding(format!("plaintext of {len} bytes exceeds the length prefix"))
    })
}

fn pad_to_size(plaintext: &[u8], target: usize) -> Result<Vec<u8>, ProtoError> {
    let len = frame_len(plaintext.len())?;
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(plaintext);
    // Random fill, not zeros (avoids compression leaks)
    let remaining = target.saturating_sub(out.len());
    if remaining > 0 {
        let mut padding = vec![0u8; remaining];
        OsRng.fill_bytes(&mut padding);
        out.extend_from_slice(&padding);
    }
    Ok(out)
}

/// Content → padded plaintext, ready for symmetric encryption.
pub fn encode_content(content: &Content, mode: PaddingMode) -> Result<Vec<u8>, ProtoError> {
    pad_to_bucket(&content.to_bytes()?, mode)
}

/// Decrypted plaintext → content.
pub fn decode_content(padded_plaintext: &[u8]) -> Result<Content, ProtoError> {
    Content::from_bytes(unpad(padded_plaintext)?)
}

/// Serde adapter: `Vec<u8>` as unpadded base64url.
pub mod b64 {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: `Option<Vec<u8>>` as optional base64url.
pub mod b64_opt {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&URL_SAFE_NO_PAD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
