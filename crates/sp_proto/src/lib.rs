//! sp_proto — Sealpost message model and wire types
//!
//! Everything here is a pure value type: no cryptography is performed in
//! this crate. The transforms between message states live in
//! `sp_messenger`.
//!
//! # Modules
//! - `id`       — user and group identifiers (`name@address`, `#group@address`)
//! - `envelope` — sender / receiver / time routing metadata
//! - `content`  — closed set of content variants and their canonical bytes
//! - `message`  — PlainMessage, SecureMessage, CertifiedMessage
//! - `codec`    — padding, content framing, base64 field adapters

pub mod codec;
pub mod content;
pub mod envelope;
pub mod error;
pub mod id;
pub mod message;

pub use codec::PaddingMode;
pub use content::{Content, ContentBody, ContentType};
pub use envelope::Envelope;
pub use error::ProtoError;
pub use id::{EntityKind, Id};
pub use message::{CertifiedMessage, KeyDelivery, PlainMessage, SecureMessage};

#[cfg(test)]
mod proptests;
