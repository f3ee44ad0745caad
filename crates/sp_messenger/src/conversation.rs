//! Conversation identity — the scope a cached content key belongs to.

use std::fmt;

use sp_proto::{Envelope, Id};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationId {
    /// Two users; stored in sorted order so both directions map to one key.
    Direct(Id, Id),
    Group(Id),
}

impl ConversationId {
    pub fn direct(a: &Id, b: &Id) -> Self {
        if a <= b {
            Self::Direct(a.clone(), b.clone())
        } else {
            Self::Direct(b.clone(), a.clone())
        }
    }

    pub fn group(group: &Id) -> Self {
        Self::Group(group.clone())
    }

    /// A trimmed member copy belongs to its group, not to the member.
    pub fn for_envelope(envelope: &Envelope) -> Self {
        if let Some(group) = envelope.group() {
            return Self::group(group);
        }
        let receiver = envelope.receiver();
        if receiver.is_group() {
            Self::group(receiver)
        } else {
            Self::direct(envelope.sender(), receiver)
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Group a message in this conversation carries in its sealed content.
    pub fn group_id(&self) -> Option<&Id> {
        match self {
            Self::Direct(..) => None,
            Self::Group(group) => Some(group),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(a, b) => write!(f, "{a}|{b}"),
            Self::Group(g) => write!(f, "{g}"),
        }
    }
}
