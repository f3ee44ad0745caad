use thiserror::Error;

use crate::id::Id;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("Key delivery does not match receiver {receiver}: {reason}")]
    KeyDeliveryMismatch { receiver: Id, reason: String },

    #[error("Message to {0} is not a group message")]
    NotAGroupMessage(Id),

    #[error("Invalid padding: {0}")]
    InvalidPadding(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
