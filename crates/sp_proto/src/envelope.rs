//! Message envelope — the routing metadata every message state carries.
//!
//! The envelope is NOT covered by the sender's signature (only the
//! ciphertext is), so relays may rewrite it, e.g. when fanning a group
//! message out to members (see `SecureMessage::trim`).

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ProtoError, id::Id};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    sender: Id,
    receiver: Id,
    /// Seconds since the Unix epoch, set by the sender.
    time: i64,
    /// Set when a group message has been trimmed for a single member.
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<Id>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    sender: Id,
    receiver: Id,
    time: i64,
    #[serde(default)]
    group: Option<Id>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ProtoError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let env = Envelope::new(raw.sender, raw.receiver, raw.time)?;
        match raw.group {
            Some(group) => env.for_group_member(group),
            None => Ok(env),
        }
    }
}

impl Envelope {
    pub fn new(sender: Id, receiver: Id, time: i64) -> Result<Self, ProtoError> {
        if time < 0 {
            return Err(ProtoError::InvalidEnvelope(format!("negative timestamp {time}")));
        }
        if sender.is_group() {
            return Err(ProtoError::InvalidEnvelope(format!("sender {sender} is a group")));
        }
        Ok(Self { sender, receiver, time, group: None })
    }

    /// Envelope stamped with the current UTC time.
    pub fn now(sender: Id, receiver: Id) -> Result<Self, ProtoError> {
        Self::new(sender, receiver, Utc::now().timestamp())
    }

    /// Copy of this envelope addressed to one member on behalf of `group`.
    pub fn for_group_member(&self, group: Id) -> Result<Self, ProtoError> {
        if !group.is_group() {
            return Err(ProtoError::InvalidEnvelope(format!("{group} is not a group ID")));
        }
        if self.receiver.is_group() {
            return Err(ProtoError::InvalidEnvelope(format!(
                "member copy must address a user, not {}",
                self.receiver
            )));
        }
        Ok(Self { group: Some(group), ..self.clone() })
    }

    pub fn sender(&self) -> &Id {
        &self.sender
    }

    pub fn receiver(&self) -> &Id {
        &self.receiver
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time, 0).single()
    }

    pub fn group(&self) -> Option<&Id> {
        self.group.as_ref()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.sender, self.receiver)?;
        if let Some(group) = &self.group {
            write!(f, " (via {group})")?;
        }
        write!(f, " @{}", self.time)
    }
}
