//! sp_messenger — Sealpost messaging core
//!
//! Turns application messages into signed, encrypted transport messages and
//! back. Transport, storage and UI live elsewhere; this crate only owns the
//! key cache and the transforms between message states.
//!
//! # Modules
//! - `transceiver`  — send / receive pipelines (the only entry points hosts need)
//! - `transform`    — encrypt, sign, verify, decrypt
//! - `key_store`    — per-conversation content keys with per-conversation locking
//! - `conversation` — conversation identity (direct pair or group)
//! - `identity`     — local user, identity resolver trait, in-memory directory
//! - `config`       — `MessengerConfig` with JSON + environment loading
//! - `error`        — error taxonomy

pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod key_store;
pub mod transceiver;
pub mod transform;

pub use config::{KeyStoreConfig, KeyWrapPolicy, MessengerConfig, TransceiverConfig};
pub use conversation::ConversationId;
pub use error::{
    ConfigError, KeyStoreError, KeyWrapFailure, KeyWrapReason, MessageError, ReceiveError,
    SendError,
};
pub use identity::{Directory, IdentityResolver, LocalUser};
pub use key_store::KeyStore;
pub use transceiver::{InboundStage, OutboundStage, Transceiver};
