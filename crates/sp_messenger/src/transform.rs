//! The four message transforms.
//!
//!   encrypt : PlainMessage     → SecureMessage
//!   sign    : SecureMessage    → CertifiedMessage
//!   verify  : CertifiedMessage → SecureMessage
//!   decrypt : SecureMessage    → PlainMessage
//!
//! Each one fails independently and is never retried here. All primitives
//! go through the capability traits.

use std::collections::BTreeMap;

use sp_crypto::{AsymmetricCipher, IdentityKeyPair, PublicKeyBytes, SymmetricCipher, SymmetricKey};
use sp_proto::{
    codec, CertifiedMessage, Envelope, Id, KeyDelivery, PaddingMode, PlainMessage, SecureMessage,
};

use crate::{
    config::KeyWrapPolicy,
    conversation::ConversationId,
    error::{KeyWrapFailure, KeyWrapReason, MessageError},
    identity::LocalUser,
    key_store::KeyStore,
};

/// A recipient of a wrapped key, with the public key the resolver returned.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: Id,
    pub public_key: Option<PublicKeyBytes>,
}

/// Who receives a wrapped copy of the content key.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Receiver already holds the key.
    Reuse,
    Single(Recipient),
    Group(Vec<Recipient>),
}

/// Result of a successful encryption.
#[derive(Debug)]
pub struct Encrypted {
    pub message: SecureMessage,
    /// Recipients a wrapped key was produced for.
    pub wrapped_for: Vec<Id>,
    /// Recipients skipped under `KeyWrapPolicy::BestEffort`.
    pub failures: Vec<KeyWrapFailure>,
}

fn wrap_for(
    recipient: &Recipient,
    transport: &[u8],
    asymmetric: &dyn AsymmetricCipher,
) -> Result<Vec<u8>, KeyWrapFailure> {
    let failure = |reason| KeyWrapFailure { recipient: recipient.id.clone(), reason };
    let public_key = recipient
        .public_key
        .as_ref()
        .ok_or_else(|| failure(KeyWrapReason::PublicKeyUnavailable))?;
    asymmetric
        .wrap(transport, public_key)
        .map_err(|_| failure(KeyWrapReason::WrapFailed))
}

/// PlainMessage → SecureMessage.
pub fn encrypt(
    plain: &PlainMessage,
    key: &SymmetricKey,
    distribution: &Distribution,
    symmetric: &dyn SymmetricCipher,
    asymmetric: &dyn AsymmetricCipher,
    padding: PaddingMode,
    policy: KeyWrapPolicy,
) -> Result<Encrypted, MessageError> {
    let framed = codec::encode_content(&plain.content, padding)
        .map_err(|_| MessageError::Encryption("content serialisation failed"))?;
    let ciphertext = symmetric
        .encrypt(&framed, key)
        .map_err(|_| MessageError::Encryption("symmetric cipher failed"))?;

    let transport = key.to_transport();
    let (delivery, wrapped_for, failures) = match distribution {
        Distribution::Reuse => (KeyDelivery::Reused, Vec::new(), Vec::new()),
        Distribution::Single(recipient) => {
            let wrapped = wrap_for(recipient, &transport, asymmetric)
                .map_err(|f| MessageError::KeyWrap(vec![f]))?;
            (KeyDelivery::Single(wrapped), vec![recipient.id.clone()], Vec::new())
        }
        Distribution::Group(members) => {
            let mut keys = BTreeMap::new();
            let mut failures = Vec::new();
            for member in members {
                match wrap_for(member, &transport, asymmetric) {
                    Ok(wrapped) => {
                        keys.insert(member.id.clone(), wrapped);
                    }
                    Err(failure) => failures.push(failure),
                }
            }
            if !failures.is_empty() && (policy == KeyWrapPolicy::Abort || keys.is_empty()) {
                return Err(MessageError::KeyWrap(failures));
            }
            let wrapped_for = keys.keys().cloned().collect();
            (KeyDelivery::PerMember(keys), wrapped_for, failures)
        }
    };

    let message = SecureMessage::new(plain.envelope.clone(), ciphertext, delivery)?;
    Ok(Encrypted { message, wrapped_for, failures })
}

/// SecureMessage → CertifiedMessage. Signs the ciphertext bytes only.
pub fn sign(
    secure: SecureMessage,
    own: &IdentityKeyPair,
    asymmetric: &dyn AsymmetricCipher,
) -> Result<CertifiedMessage, MessageError> {
    let signature = asymmetric
        .sign(secure.ciphertext(), own)
        .map_err(|_| MessageError::Signing)?;
    CertifiedMessage::new(secure, signature).map_err(|_| MessageError::Signing)
}

/// CertifiedMessage → SecureMessage. A missing sender key is a verification
/// failure.
pub fn verify(
    certified: CertifiedMessage,
    sender_key: Option<&PublicKeyBytes>,
    asymmetric: &dyn AsymmetricCipher,
) -> Result<SecureMessage, MessageError> {
    let sender = certified.envelope().sender().clone();
    let key = sender_key.ok_or_else(|| MessageError::Verification(sender.clone()))?;
    if !asymmetric.verify(certified.ciphertext(), certified.signature(), key) {
        return Err(MessageError::Verification(sender));
    }
    let (secure, _signature) = certified.into_parts();
    Ok(secure)
}

/// Users known to hold the key carried by `secure`.
fn key_holders(envelope: &Envelope, secure: &SecureMessage, me: &Id) -> Vec<Id> {
    let mut holders = vec![envelope.sender().clone(), me.clone()];
    if let Some(keys) = secure.encrypted_keys() {
        holders.extend(keys.keys().cloned());
    }
    holders
}

/// SecureMessage → PlainMessage.
///
/// A wrapped key addressed to `me` is opened; otherwise the conversation's
/// cached key is used. The envelope is unsigned, so a delivered key is cached
/// only after the sealed content proves it belongs to the envelope's
/// conversation. Failure with the cached key, or no key at all, invalidates
/// the conversation's cached key.
pub fn decrypt(
    secure: &SecureMessage,
    me: &LocalUser,
    asymmetric: &dyn AsymmetricCipher,
    key_store: &KeyStore,
) -> Result<PlainMessage, MessageError> {
    let envelope = secure.envelope();
    let conv = ConversationId::for_envelope(envelope);

    let delivered = match secure.wrapped_key_for(me.id()) {
        Some(wrapped) => {
            let opened = asymmetric
                .unwrap(wrapped, me.keys())
                .map_err(|_| MessageError::KeyUnwrap)?;
            Some(SymmetricKey::from_transport(&opened).map_err(|_| MessageError::KeyUnwrap)?)
        }
        None => None,
    };

    let plaintext = match &delivered {
        Some(key) => key_store
            .cipher()
            .decrypt(secure.ciphertext(), key)
            .map_err(|_| MessageError::Decryption(conv.clone()))?,
        None => {
            let Some(key) = key_store.get_key(&conv) else {
                key_store.invalidate(&conv);
                return Err(MessageError::KeyNotFound(conv));
            };
            match key_store.cipher().decrypt(secure.ciphertext(), &key) {
                Ok(pt) => pt,
                Err(_) => {
                    key_store.invalidate(&conv);
                    return Err(MessageError::Decryption(conv));
                }
            }
        }
    };
    let content = codec::decode_content(&plaintext)
        .map_err(|e| MessageError::MalformedContent(e.to_string()))?;

    if content.group.as_ref() != conv.group_id() {
        return Err(MessageError::ConversationMismatch { envelope: conv, sealed: content.group });
    }
    if let Some(key) = delivered {
        key_store.put_received_key(&conv, key, key_holders(envelope, secure, me.id()));
    }
    Ok(PlainMessage::new(envelope.clone(), content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_crypto::{AeadCipher, IdentityCipher};
    use sp_proto::Content;

    use crate::config::KeyStoreConfig;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    fn recipient(user: &LocalUser) -> Recipient {
        Recipient { id: user.id().clone(), public_key: Some(user.public_key().clone()) }
    }

    fn plain(from: &LocalUser, to: &Id, text: &str) -> PlainMessage {
        let envelope = Envelope::new(from.id().clone(), to.clone(), 1_700_000_000).unwrap();
        PlainMessage::new(envelope, Content::text(text))
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let msg = plain(&alice, bob.id(), "hello");
        let key = SymmetricKey::generate(Default::default());

        let enc = encrypt(
            &msg,
            &key,
            &Distribution::Single(recipient(&bob)),
            &AeadCipher::default(),
            &IdentityCipher,
            PaddingMode::Buckets,
            KeyWrapPolicy::Abort,
        )
        .unwrap();
        assert!(enc.message.encrypted_key().is_some());
        assert_eq!(enc.wrapped_for, vec![bob.id().clone()]);

        let bob_store = KeyStore::from_config(&KeyStoreConfig::default());
        let out = decrypt(&enc.message, &bob, &IdentityCipher, &bob_store).unwrap();
        assert_eq!(out, msg);
        let conv = ConversationId::for_envelope(&msg.envelope);
        assert_eq!(bob_store.get_key(&conv), Some(key));
    }

    #[test]
    fn single_recipient_without_key_fails_wrap() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = id("bob@hub");
        let msg = plain(&alice, &bob, "hi");
        let err = encrypt(
            &msg,
            &SymmetricKey::generate(Default::default()),
            &Distribution::Single(Recipient { id: bob.clone(), public_key: None }),
            &AeadCipher::default(),
            &IdentityCipher,
            PaddingMode::None,
            KeyWrapPolicy::BestEffort,
        )
        .unwrap_err();
        match err {
            MessageError::KeyWrap(failures) => {
                let expected =
                    KeyWrapFailure { recipient: bob, reason: KeyWrapReason::PublicKeyUnavailable };
                assert_eq!(failures, vec![expected]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn group_wrap_policy() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let ghost = Recipient { id: id("ghost@hub"), public_key: None };
        let members = Distribution::Group(vec![recipient(&alice), recipient(&bob), ghost]);
        let msg = plain(&alice, &id("#team@hub"), "group hello");
        let key = SymmetricKey::generate(Default::default());

        let run = |policy| {
            let aead = AeadCipher::default();
            encrypt(&msg, &key, &members, &aead, &IdentityCipher, PaddingMode::Buckets, policy)
        };
        assert!(matches!(run(KeyWrapPolicy::Abort), Err(MessageError::KeyWrap(f)) if f.len() == 1));

        let partial = run(KeyWrapPolicy::BestEffort).unwrap();
        assert_eq!(partial.message.encrypted_keys().unwrap().len(), 2);
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(partial.failures[0].recipient, id("ghost@hub"));
    }

    #[test]
    fn sign_then_verify_returns_same_message() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let secure = SecureMessage::new(
            Envelope::new(alice.id().clone(), id("bob@hub"), 5).unwrap(),
            vec![1, 2, 3, 4],
            KeyDelivery::Reused,
        )
        .unwrap();
        let certified = sign(secure.clone(), alice.keys(), &IdentityCipher).unwrap();
        let verified =
            verify(certified.clone(), Some(alice.public_key()), &IdentityCipher).unwrap();
        assert_eq!(verified, secure);

        let mallory = LocalUser::generate(id("mallory@hub")).unwrap();
        assert!(matches!(
            verify(certified.clone(), Some(mallory.public_key()), &IdentityCipher),
            Err(MessageError::Verification(_))
        ));
        assert!(matches!(
            verify(certified, None, &IdentityCipher),
            Err(MessageError::Verification(_))
        ));
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let msg = plain(&alice, bob.id(), "no key");
        let enc = encrypt(
            &msg,
            &SymmetricKey::generate(Default::default()),
            &Distribution::Reuse,
            &AeadCipher::default(),
            &IdentityCipher,
            PaddingMode::Buckets,
            KeyWrapPolicy::Abort,
        )
        .unwrap();
        assert!(enc.message.delivery().is_reused());
        let store = KeyStore::from_config(&KeyStoreConfig::default());
        assert!(matches!(
            decrypt(&enc.message, &bob, &IdentityCipher, &store),
            Err(MessageError::KeyNotFound(_))
        ));
    }

    #[test]
    fn wrong_cached_key_invalidates() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let msg = plain(&alice, bob.id(), "stale");
        let enc = encrypt(
            &msg,
            &SymmetricKey::generate(Default::default()),
            &Distribution::Reuse,
            &AeadCipher::default(),
            &IdentityCipher,
            PaddingMode::Buckets,
            KeyWrapPolicy::Abort,
        )
        .unwrap();
        let store = KeyStore::from_config(&KeyStoreConfig::default());
        let conv = ConversationId::for_envelope(&msg.envelope);
        store.get_or_create_key(&conv).unwrap();
        assert!(matches!(
            decrypt(&enc.message, &bob, &IdentityCipher, &store),
            Err(MessageError::Decryption(_))
        ));
        assert!(store.get_key(&conv).is_none());
    }

    #[test]
    fn garbage_plaintext_is_malformed_content() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let key = SymmetricKey::generate(Default::default());
        let ciphertext = AeadCipher::default().encrypt(b"\x03\x00\x00\x00abc", &key).unwrap();
        let secure = SecureMessage::new(
            Envelope::new(alice.id().clone(), bob.id().clone(), 1).unwrap(),
            ciphertext,
            KeyDelivery::Reused,
        )
        .unwrap();
        let store = KeyStore::from_config(&KeyStoreConfig::default());
        let conv = ConversationId::for_envelope(secure.envelope());
        store.put_key(&conv, key);
        assert!(matches!(
            decrypt(&secure, &bob, &IdentityCipher, &store),
            Err(MessageError::MalformedContent(_))
        ));
        assert!(store.get_key(&conv).is_some(), "malformed content keeps the key");
    }

    #[test]
    fn delivered_key_is_cached_only_under_its_sealed_group() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let other = id("#other@hub");
        let key = SymmetricKey::generate(Default::default());
        let copy_for_bob = |sealed: &str| {
            let envelope = Envelope::new(alice.id().clone(), bob.id().clone(), 1)
                .unwrap()
                .for_group_member(other.clone())
                .unwrap();
            let content = Content::text("members only").in_group(id(sealed));
            let msg = PlainMessage::new(envelope, content);
            encrypt(
                &msg,
                &key,
                &Distribution::Single(recipient(&bob)),
                &AeadCipher::default(),
                &IdentityCipher,
                PaddingMode::Buckets,
                KeyWrapPolicy::Abort,
            )
            .unwrap()
            .message
        };
        let store = KeyStore::from_config(&KeyStoreConfig::default());
        let conv = ConversationId::group(&other);

        let err = decrypt(&copy_for_bob("#team@hub"), &bob, &IdentityCipher, &store).unwrap_err();
        assert!(matches!(
            err,
            MessageError::ConversationMismatch { sealed: Some(g), .. } if g == id("#team@hub")
        ));
        assert!(store.get_key(&conv).is_none());

        let out = decrypt(&copy_for_bob("#other@hub"), &bob, &IdentityCipher, &store).unwrap();
        assert_eq!(out.content.group, Some(other.clone()));
        assert_eq!(store.get_key(&conv), Some(key.clone()));
    }

    #[test]
    fn bad_delivered_key_keeps_cached_key() {
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        let bob = LocalUser::generate(id("bob@hub")).unwrap();
        let msg = plain(&alice, bob.id(), "hello");
        let sealed_under = SymmetricKey::generate(Default::default());
        let framed = codec::encode_content(&msg.content, PaddingMode::Buckets).unwrap();
        let ciphertext = AeadCipher::default().encrypt(&framed, &sealed_under).unwrap();
        let wrong = SymmetricKey::generate(Default::default());
        let wrapped = IdentityCipher.wrap(&wrong.to_transport(), bob.public_key()).unwrap();
        let secure =
            SecureMessage::new(msg.envelope.clone(), ciphertext, KeyDelivery::Single(wrapped))
                .unwrap();

        let store = KeyStore::from_config(&KeyStoreConfig::default());
        let conv = ConversationId::for_envelope(&msg.envelope);
        store.put_key(&conv, sealed_under.clone());
        assert!(matches!(
            decrypt(&secure, &bob, &IdentityCipher, &store),
            Err(MessageError::Decryption(_))
        ));
        assert_eq!(store.get_key(&conv), Some(sealed_under));
    }
}
