//! Transceiver — sequences the transforms for one send or one receive.
//!
//!   send:    Composing → Encrypting → Signing → Sent | Failed
//!   receive: Received  → Verifying  → Decrypting → Delivered | Rejected
//!
//! No primitive is called from here; keys come from the `KeyStore`, public
//! keys and memberships from the `IdentityResolver`, and all cryptography
//! from the capability traits.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sp_crypto::{hash, AsymmetricCipher, IdentityCipher};
use sp_proto::{CertifiedMessage, Id, PlainMessage};

use crate::{
    config::TransceiverConfig,
    conversation::ConversationId,
    error::{KeyWrapFailure, KeyWrapReason, MessageError, ReceiveError, SendError},
    identity::{IdentityResolver, LocalUser},
    key_store::{KeyStore, LeasePolicy},
    transform::{self, Distribution, Recipient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundStage {
    Composing,
    Encrypting,
    Signing,
    Sent,
    Failed,
}

impl fmt::Display for OutboundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Composing => "composing",
            Self::Encrypting => "encrypting",
            Self::Signing => "signing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundStage {
    Received,
    Verifying,
    Decrypting,
    Delivered,
    Rejected,
}

impl fmt::Display for InboundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Verifying => "verifying",
            Self::Decrypting => "decrypting",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        })
    }
}

pub struct Transceiver {
    user: LocalUser,
    resolver: Arc<dyn IdentityResolver>,
    key_store: Arc<KeyStore>,
    asymmetric: Arc<dyn AsymmetricCipher>,
    config: TransceiverConfig,
}

impl Transceiver {
    /// Transceiver using the default Ed25519 / X25519 asymmetric capability.
    pub fn new(
        user: LocalUser,
        resolver: Arc<dyn IdentityResolver>,
        key_store: Arc<KeyStore>,
        config: TransceiverConfig,
    ) -> Self {
        Self { user, resolver, key_store, asymmetric: Arc::new(IdentityCipher), config }
    }

    pub fn with_asymmetric(mut self, asymmetric: Arc<dyn AsymmetricCipher>) -> Self {
        self.asymmetric = asymmetric;
        self
    }

    pub fn user(&self) -> &LocalUser {
        &self.user
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    /// Encrypt and sign `plain` for transport.
    ///
    /// The sealed content is stamped with the conversation's group, so the
    /// receiver can check the unsigned envelope against it.
    pub fn send(&self, mut plain: PlainMessage) -> Result<CertifiedMessage, SendError> {
        let conv = ConversationId::for_envelope(&plain.envelope);
        plain.content.group = conv.group_id().cloned();
        tracing::info!(
            target: "sp_messenger",
            event = "send_message_start",
            conversation = %conv,
            receiver = %plain.envelope.receiver(),
            kind = %plain.content.content_type(),
            sn = plain.content.sn
        );

        let mut stage = OutboundStage::Composing;
        match self.run_send(&plain, &conv, &mut stage) {
            Ok(certified) => {
                self.enter_outbound(&conv, OutboundStage::Sent);
                Ok(certified)
            }
            Err(error) => {
                tracing::error!(
                    target: "sp_messenger",
                    event = "send_message_failed",
                    conversation = %conv,
                    receiver = %plain.envelope.receiver(),
                    stage = %stage,
                    error = %error
                );
                self.enter_outbound(&conv, OutboundStage::Failed);
                Err(SendError { envelope: plain.envelope, stage, error })
            }
        }
    }

    fn run_send(
        &self,
        plain: &PlainMessage,
        conv: &ConversationId,
        stage: &mut OutboundStage,
    ) -> Result<CertifiedMessage, MessageError> {
        self.enter_outbound(conv, *stage);
        let envelope = &plain.envelope;
        if envelope.sender() != self.user.id() {
            return Err(MessageError::SenderMismatch {
                expected: self.user.id().clone(),
                found: envelope.sender().clone(),
            });
        }
        let receiver = envelope.receiver();
        let recipients = self.recipients(receiver)?;

        *stage = OutboundStage::Encrypting;
        self.enter_outbound(conv, *stage);
        let lease = self.key_store.lease(
            conv,
            &recipients,
            LeasePolicy {
                always_wrap: self.config.always_wrap_key,
                rotate_on_membership_change: self.config.rotate_on_membership_change,
            },
        )?;
        let fingerprint = lease.key.fingerprint();

        let distribution = if !lease.wrap {
            Distribution::Reuse
        } else if receiver.is_group() {
            Distribution::Group(recipients.iter().map(|id| self.recipient(id)).collect())
        } else {
            Distribution::Single(self.recipient(receiver))
        };

        let encrypted = transform::encrypt(
            plain,
            &lease.key,
            &distribution,
            self.key_store.cipher(),
            self.asymmetric.as_ref(),
            self.config.padding,
            self.config.key_wrap_policy,
        )?;
        for failure in &encrypted.failures {
            tracing::warn!(
                target: "sp_messenger",
                event = "key_wrap_skipped",
                conversation = %conv,
                recipient = %failure.recipient,
                reason = %failure
            );
        }

        *stage = OutboundStage::Signing;
        self.enter_outbound(conv, *stage);
        let wrapped_for = encrypted.wrapped_for;
        let wrap_failures = encrypted.failures.len();
        let certified =
            transform::sign(encrypted.message, self.user.keys(), self.asymmetric.as_ref())?;

        self.key_store.mark_delivered(conv, &fingerprint, &wrapped_for);
        tracing::info!(
            target: "sp_messenger",
            event = "send_message_ok",
            conversation = %conv,
            receiver = %receiver,
            key_fingerprint = %fingerprint,
            key_origin = lease.origin.as_str(),
            wrapped = wrapped_for.len(),
            wrap_failures,
            ciphertext = %hash::ciphertext_digest(certified.ciphertext())
        );
        Ok(certified)
    }

    /// Users that must be able to open the content key.
    fn recipients(&self, receiver: &Id) -> Result<BTreeSet<Id>, MessageError> {
        if !receiver.is_group() {
            return Ok(BTreeSet::from([receiver.clone()]));
        }
        match self.resolver.members(receiver) {
            Some(members) if !members.is_empty() => Ok(members.into_iter().collect()),
            _ => Err(MessageError::KeyWrap(vec![KeyWrapFailure {
                recipient: receiver.clone(),
                reason: KeyWrapReason::MembershipUnknown,
            }])),
        }
    }

    fn recipient(&self, id: &Id) -> Recipient {
        Recipient { id: id.clone(), public_key: self.resolver.public_key(id) }
    }

    fn enter_outbound(&self, conv: &ConversationId, stage: OutboundStage) {
        tracing::debug!(
            target: "sp_messenger",
            event = "send_stage",
            conversation = %conv,
            stage = %stage
        );
    }

    fn enter_inbound(&self, conv: &ConversationId, stage: InboundStage) {
        tracing::debug!(
            target: "sp_messenger",
            event = "receive_stage",
            conversation = %conv,
            stage = %stage
        );
    }

    /// Verify and decrypt an incoming message.
    pub fn receive(&self, certified: CertifiedMessage) -> Result<PlainMessage, ReceiveError> {
        let envelope = certified.envelope().clone();
        let conv = ConversationId::for_envelope(&envelope);
        tracing::info!(
            target: "sp_messenger",
            event = "receive_message_start",
            conversation = %conv,
            sender = %envelope.sender(),
            ciphertext = %hash::ciphertext_digest(certified.ciphertext()),
            key_attached = !certified.secure().delivery().is_reused()
        );
        self.enter_inbound(&conv, InboundStage::Received);

        let mut stage = InboundStage::Verifying;
        let result = self.run_receive(certified, &conv, &mut stage);
        match result {
            Ok(plain) => {
                self.enter_inbound(&conv, InboundStage::Delivered);
                tracing::info!(
                    target: "sp_messenger",
                    event = "receive_message_ok",
                    conversation = %conv,
                    sender = %envelope.sender(),
                    kind = %plain.content.content_type(),
                    sn = plain.content.sn
                );
                Ok(plain)
            }
            Err(error) => {
                tracing::warn!(
                    target: "sp_messenger",
                    event = "receive_message_failed",
                    conversation = %conv,
                    sender = %envelope.sender(),
                    stage = %stage,
                    error = %error
                );
                self.enter_inbound(&conv, InboundStage::Rejected);
                Err(ReceiveError { envelope, stage, error })
            }
        }
    }

    fn run_receive(
        &self,
        certified: CertifiedMessage,
        conv: &ConversationId,
        stage: &mut InboundStage,
    ) -> Result<PlainMessage, MessageError> {
        self.enter_inbound(conv, *stage);
        let sender_key = self.resolver.public_key(certified.envelope().sender());
        let secure = transform::verify(certified, sender_key.as_ref(), self.asymmetric.as_ref())?;

        *stage = InboundStage::Decrypting;
        self.enter_inbound(conv, *stage);
        transform::decrypt(&secure, &self.user, self.asymmetric.as_ref(), &self.key_store)
    }
}

impl fmt::Debug for Transceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transceiver")
            .field("user", self.user.id())
            .field("key_store", &self.key_store)
            .field("config", &self.config)
            .finish()
    }
}
