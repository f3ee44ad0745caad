use sp_proto::{Envelope, Id, ProtoError};
use thiserror::Error;

use crate::{
    conversation::ConversationId,
    transceiver::{InboundStage, OutboundStage},
};

/// One recipient whose copy of the content key could not be wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWrapFailure {
    pub recipient: Id,
    pub reason: KeyWrapReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrapReason {
    /// The identity resolver has no public key for the recipient.
    PublicKeyUnavailable,
    /// The asymmetric capability rejected the wrap.
    WrapFailed,
    /// Group membership could not be resolved.
    MembershipUnknown,
}

impl std::fmt::Display for KeyWrapFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            KeyWrapReason::PublicKeyUnavailable => "public key unavailable",
            KeyWrapReason::WrapFailed => "wrap failed",
            KeyWrapReason::MembershipUnknown => "membership unknown",
        };
        write!(f, "{}: {reason}", self.recipient)
    }
}

fn list_failures(failures: &[KeyWrapFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn sealed_group(group: &Option<Id>) -> String {
    group.as_ref().map_or_else(|| "(none)".to_string(), ToString::to_string)
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Key generation failed for {0}")]
    Generation(ConversationId),

    #[error("Concurrent key conflict on {0}")]
    ConcurrentKeyConflict(ConversationId),
}

/// Failure of a single transform. Cipher diagnostics never cross this
/// boundary; only the kind of failure does.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Key wrap failed for {}", list_failures(.0))]
    KeyWrap(Vec<KeyWrapFailure>),

    #[error("Encryption failed: {0}")]
    Encryption(&'static str),

    #[error("Signing failed")]
    Signing,

    #[error("Signature verification failed for message from {0}")]
    Verification(Id),

    #[error("No key cached for conversation {0}")]
    KeyNotFound(ConversationId),

    #[error("Decryption failed for conversation {0}")]
    Decryption(ConversationId),

    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Wrapped key could not be opened")]
    KeyUnwrap,

    /// The envelope names a conversation the sealed content does not belong to.
    #[error("Conversation {envelope} does not match sealed group {}", sealed_group(.sealed))]
    ConversationMismatch { envelope: ConversationId, sealed: Option<Id> },

    #[error("Envelope sender {found} is not the local user {expected}")]
    SenderMismatch { expected: Id, found: Id },

    #[error("Concurrent key conflict on {0}")]
    ConcurrentKeyConflict(ConversationId),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

impl From<KeyStoreError> for MessageError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::Generation(_) => Self::Encryption("key generation failed"),
            KeyStoreError::ConcurrentKeyConflict(conv) => Self::ConcurrentKeyConflict(conv),
        }
    }
}

/// Outbound pipeline failure: the typed error, the stage that produced it,
/// and the envelope of the offending message.
#[derive(Debug, Error)]
#[error("Send {envelope} failed while {stage}: {error}")]
pub struct SendError {
    pub envelope: Envelope,
    pub stage: OutboundStage,
    #[source]
    pub error: MessageError,
}

#[derive(Debug, Error)]
#[error("Receive {envelope} failed while {stage}: {error}")]
pub struct ReceiveError {
    pub envelope: Envelope,
    pub stage: InboundStage,
    #[source]
    pub error: MessageError,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value `{value}` for {var}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Unknown key wrap policy `{0}`")]
    UnknownKeyWrapPolicy(String),
}
