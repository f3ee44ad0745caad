//! The three message states.
//!
//!   PlainMessage  ──encrypt──►  SecureMessage  ──sign──►  CertifiedMessage
//!   PlainMessage  ◄─decrypt──   SecureMessage  ◄─verify─  CertifiedMessage
//!
//! Each state is a distinct immutable type; the transforms live in the
//! messenger crate. Only `CertifiedMessage` has a wire form.
//!
//! # Wire form (JSON)
//! ```json
//! { "sender": "alice@hub", "receiver": "#team@hub", "time": 1700000000,
//!   "data": "<b64 ciphertext>",
//!   "keys": { "bob@hub": "<b64 wrapped key>", ... },
//!   "signature": "<b64 signature over data>" }
//! ```
//! Direct messages carry `key` instead of `keys`; both are absent when the
//! receiver is expected to hold the key already.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{codec, content::Content, envelope::Envelope, error::ProtoError, id::Id};

// ── PlainMessage ─────────────────────────────────────────────────────────────

/// Cleartext message. Never leaves the process.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainMessage {
    pub envelope: Envelope,
    pub content: Content,
}

impl PlainMessage {
    pub fn new(envelope: Envelope, content: Content) -> Self {
        Self { envelope, content }
    }
}

// ── Key delivery ─────────────────────────────────────────────────────────────

/// How the content key travels with a SecureMessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDelivery {
    /// No key attached; the receiver must already hold it.
    Reused,
    /// Key wrapped for the single receiver.
    Single(Vec<u8>),
    /// Key wrapped once per group member.
    PerMember(BTreeMap<Id, Vec<u8>>),
}

impl KeyDelivery {
    pub fn is_reused(&self) -> bool {
        matches!(self, Self::Reused)
    }

    fn check(&self, envelope: &Envelope) -> Result<(), ProtoError> {
        let receiver = envelope.receiver();
        let mismatch = |reason: &str| ProtoError::KeyDeliveryMismatch {
            receiver: receiver.clone(),
            reason: reason.to_string(),
        };
        match self {
            Self::Reused => Ok(()),
            Self::Single(_) if receiver.is_group() => {
                Err(mismatch("group message needs per-member keys"))
            }
            Self::Single(key) if key.is_empty() => Err(mismatch("empty wrapped key")),
            Self::Single(_) => Ok(()),
            Self::PerMember(_) if !receiver.is_group() => {
                Err(mismatch("single-receiver message cannot carry per-member keys"))
            }
            Self::PerMember(keys) if keys.is_empty() => Err(mismatch("no member keys")),
            Self::PerMember(keys) => match keys.iter().find(|(_, v)| v.is_empty()) {
                Some((member, _)) => Err(mismatch(&format!("empty wrapped key for {member}"))),
                None => Ok(()),
            },
        }
    }
}

// ── SecureMessage ────────────────────────────────────────────────────────────

/// Encrypted, unsigned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureMessage {
    envelope: Envelope,
    ciphertext: Vec<u8>,
    delivery: KeyDelivery,
}

impl SecureMessage {
    /// Checks that the key delivery shape matches the receiver kind.
    pub fn new(
        envelope: Envelope,
        ciphertext: Vec<u8>,
        delivery: KeyDelivery,
    ) -> Result<Self, ProtoError> {
        if ciphertext.is_empty() {
            return Err(ProtoError::MissingField("data"));
        }
        delivery.check(&envelope)?;
        Ok(Self { envelope, ciphertext, delivery })
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn delivery(&self) -> &KeyDelivery {
        &self.delivery
    }

    pub fn encrypted_key(&self) -> Option<&[u8]> {
        match &self.delivery {
            KeyDelivery::Single(key) => Some(key),
            _ => None,
        }
    }

    pub fn encrypted_keys(&self) -> Option<&BTreeMap<Id, Vec<u8>>> {
        match &self.delivery {
            KeyDelivery::PerMember(keys) => Some(keys),
            _ => None,
        }
    }

    /// Wrapped key addressed to `user`, if any.
    pub fn wrapped_key_for(&self, user: &Id) -> Option<&[u8]> {
        match &self.delivery {
            KeyDelivery::Reused => None,
            KeyDelivery::Single(key) => {
                (self.envelope.receiver() == user).then_some(key.as_slice())
            }
            KeyDelivery::PerMember(keys) => keys.get(user).map(Vec::as_slice),
        }
    }

    /// Copy of a group message addressed to one member. The ciphertext is
    /// unchanged; only the member's own wrapped key is kept.
    pub fn trim(&self, member: &Id) -> Result<Self, ProtoError> {
        let group = self.envelope.receiver();
        if !group.is_group() {
            return Err(ProtoError::NotAGroupMessage(group.clone()));
        }
        let sender = self.envelope.sender().clone();
        let envelope = Envelope::new(sender, member.clone(), self.envelope.time())?
            .for_group_member(group.clone())?;
        let delivery = match self.wrapped_key_for(member) {
            Some(key) => KeyDelivery::Single(key.to_vec()),
            None => KeyDelivery::Reused,
        };
        Self::new(envelope, self.ciphertext.clone(), delivery)
    }

    /// `trim` for every listed member.
    pub fn split(&self, members: &[Id]) -> Result<Vec<Self>, ProtoError> {
        members.iter().map(|m| self.trim(m)).collect()
    }
}

// ── CertifiedMessage ─────────────────────────────────────────────────────────

/// Signed SecureMessage, ready for transport. The signature covers the
/// ciphertext bytes only, so envelope and key fields may be rewritten by
/// relays (see `trim`) without invalidating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct CertifiedMessage {
    secure: SecureMessage,
    signature: Vec<u8>,
}

impl CertifiedMessage {
    pub fn new(secure: SecureMessage, signature: Vec<u8>) -> Result<Self, ProtoError> {
        if signature.is_empty() {
            return Err(ProtoError::MissingField("signature"));
        }
        Ok(Self { secure, signature })
    }

    pub fn secure(&self) -> &SecureMessage {
        &self.secure
    }

    pub fn envelope(&self) -> &Envelope {
        self.secure.envelope()
    }

    pub fn ciphertext(&self) -> &[u8] {
        self.secure.ciphertext()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Drop the signature, yielding the embedded SecureMessage.
    pub fn into_parts(self) -> (SecureMessage, Vec<u8>) {
        (self.secure, self.signature)
    }

    pub fn trim(&self, member: &Id) -> Result<Self, ProtoError> {
        Ok(Self { secure: self.secure.trim(member)?, signature: self.signature.clone() })
    }

    pub fn split(&self, members: &[Id]) -> Result<Vec<Self>, ProtoError> {
        members.iter().map(|m| self.trim(m)).collect()
    }

    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(with = "codec::b64")]
    data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "codec::b64_opt")]
    key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keys: Option<BTreeMap<Id, WireBytes>>,
    #[serde(with = "codec::b64")]
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct WireBytes(#[serde(with = "codec::b64")] Vec<u8>);

impl TryFrom<WireMessage> for CertifiedMessage {
    type Error = ProtoError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let delivery = match (wire.key, wire.keys) {
            (Some(_), Some(_)) => {
                return Err(ProtoError::KeyDeliveryMismatch {
                    receiver: wire.envelope.receiver().clone(),
                    reason: "both `key` and `keys` present".into(),
                })
            }
            (Some(key), None) => KeyDelivery::Single(key),
            (None, Some(keys)) => {
                KeyDelivery::PerMember(keys.into_iter().map(|(id, WireBytes(k))| (id, k)).collect())
            }
            (None, None) => KeyDelivery::Reused,
        };
        let secure = SecureMessage::new(wire.envelope, wire.data, delivery)?;
        CertifiedMessage::new(secure, wire.signature)
    }
}

impl From<CertifiedMessage> for WireMessage {
    fn from(msg: CertifiedMessage) -> Self {
        let CertifiedMessage { secure, signature } = msg;
        let SecureMessage { envelope, ciphertext, delivery } = secure;
        let (key, keys) = match delivery {
            KeyDelivery::Reused => (None, None),
            KeyDelivery::Single(key) => (Some(key), None),
            KeyDelivery::PerMember(keys) => {
                (None, Some(keys.into_iter().map(|(id, k)| (id, WireBytes(k))).collect()))
            }
        };
        WireMessage { envelope, data: ciphertext, key, keys, signature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    fn group_message() -> SecureMessage {
        let envelope = Envelope::new(id("alice@hub"), id("#team@hub"), 100).unwrap();
        let mut keys = BTreeMap::new();
        keys.insert(id("alice@hub"), vec![1]);
        keys.insert(id("bob@hub"), vec![2]);
        keys.insert(id("carol@hub"), vec![3]);
        SecureMessage::new(envelope, vec![0xAA; 8], KeyDelivery::PerMember(keys)).unwrap()
    }

    #[test]
    fn delivery_must_match_receiver_kind() {
        let direct = Envelope::new(id("a@x"), id("b@x"), 1).unwrap();
        let group = Envelope::new(id("a@x"), id("#g@x"), 1).unwrap();
        let per_member = KeyDelivery::PerMember([(id("b@x"), vec![1])].into());

        assert!(SecureMessage::new(direct.clone(), vec![1], KeyDelivery::Single(vec![1])).is_ok());
        assert!(SecureMessage::new(direct.clone(), vec![1], KeyDelivery::Reused).is_ok());
        assert!(matches!(
            SecureMessage::new(direct.clone(), vec![1], per_member.clone()),
            Err(ProtoError::KeyDeliveryMismatch { .. })
        ));
        assert!(SecureMessage::new(group.clone(), vec![1], per_member).is_ok());
        assert!(SecureMessage::new(group.clone(), vec![1], KeyDelivery::Single(vec![1])).is_err());
        let nobody = KeyDelivery::PerMember(BTreeMap::new());
        assert!(SecureMessage::new(group, vec![1], nobody).is_err());
    }

    #[test]
    fn empty_values_are_rejected() {
        let direct = Envelope::new(id("a@x"), id("b@x"), 1).unwrap();
        assert!(matches!(
            SecureMessage::new(direct.clone(), vec![], KeyDelivery::Reused),
            Err(ProtoError::MissingField("data"))
        ));
        assert!(SecureMessage::new(direct.clone(), vec![1], KeyDelivery::Single(vec![])).is_err());
        let secure = SecureMessage::new(direct, vec![1], KeyDelivery::Reused).unwrap();
        assert!(CertifiedMessage::new(secure, vec![]).is_err());
    }

    #[test]
    fn trim_keeps_ciphertext_and_member_key() {
        let msg = group_message();
        let for_bob = msg.trim(&id("bob@hub")).unwrap();
        assert_eq!(for_bob.envelope().receiver(), &id("bob@hub"));
        assert_eq!(for_bob.envelope().group(), Some(&id("#team@hub")));
        assert_eq!(for_bob.ciphertext(), msg.ciphertext());
        assert_eq!(for_bob.encrypted_key(), Some(&[2u8][..]));

        let for_dave = msg.trim(&id("dave@hub")).unwrap();
        assert!(for_dave.delivery().is_reused());
    }

    #[test]
    fn trim_requires_group_message() {
        let msg = group_message().trim(&id("bob@hub")).unwrap();
        assert!(matches!(msg.trim(&id("carol@hub")), Err(ProtoError::NotAGroupMessage(_))));
    }

    #[test]
    fn split_preserves_signature() {
        let certified = CertifiedMessage::new(group_message(), vec![7; 64]).unwrap();
        let members = [id("bob@hub"), id("carol@hub")];
        let copies = certified.split(&members).unwrap();
        assert_eq!(copies.len(), 2);
        for (copy, member) in copies.iter().zip(&members) {
            assert_eq!(copy.signature(), certified.signature());
            assert_eq!(copy.envelope().receiver(), member);
        }
    }

    #[test]
    fn wire_form_round_trips() {
        let certified = CertifiedMessage::new(group_message(), vec![7; 64]).unwrap();
        let json = certified.to_json().unwrap();
        assert!(json.contains(r#""keys":{"#));
        assert!(!json.contains(r#""key":"#));
        assert_eq!(CertifiedMessage::from_json(&json).unwrap(), certified);

        let trimmed = certified.trim(&id("bob@hub")).unwrap();
        let json = trimmed.to_json().unwrap();
        assert!(json.contains(r##""group":"#team@hub""##));
        assert_eq!(CertifiedMessage::from_json(&json).unwrap(), trimmed);
    }

    #[test]
    fn wire_form_rejects_both_key_fields() {
        let json = concat!(
            r#"{"sender":"a@x","receiver":"b@x","time":1,"data":"AQ","#,
            r#""key":"AQ","keys":{"b@x":"AQ"},"signature":"AQ"}"#
        );
        assert!(CertifiedMessage::from_json(json).is_err());
        let missing_sig = r#"{"sender":"a@x","receiver":"b@x","time":1,"data":"AQ"}"#;
        assert!(CertifiedMessage::from_json(missing_sig).is_err());
    }
}
