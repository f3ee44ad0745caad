//! Per-conversation content-key cache.
//!
//! Every conversation gets its own slot behind its own lock; the map lock is
//! only held long enough to find (or create) a slot, so traffic in unrelated
//! conversations never contends. Slots are never removed: `invalidate`
//! empties a slot in place.
//!
//! Besides the key itself each entry records who is known to hold it. The
//! outbound path uses that to decide whether the key must be wrapped again
//! (see `lease`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use sp_crypto::{AeadCipher, SymmetricCipher, SymmetricKey};
use sp_proto::Id;

use crate::{config::KeyStoreConfig, conversation::ConversationId, error::KeyStoreError};

struct CachedKey {
    key: SymmetricKey,
    /// Group membership the key was first distributed to.
    members: Option<BTreeSet<Id>>,
    /// Users known to hold the key.
    holders: BTreeSet<Id>,
}

impl CachedKey {
    fn new(key: SymmetricKey) -> Self {
        Self { key, members: None, holders: BTreeSet::new() }
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CachedKey>,
}

/// How the outbound key was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Cached,
    Generated,
    /// Replaced because group membership changed.
    Rotated,
}

impl KeyOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Generated => "generated",
            Self::Rotated => "rotated",
        }
    }
}

/// Key handed to one outbound message.
#[derive(Debug, Clone)]
pub struct OutboundKey {
    pub key: SymmetricKey,
    /// Whether the key must travel wrapped with this message.
    pub wrap: bool,
    pub origin: KeyOrigin,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeasePolicy {
    pub always_wrap: bool,
    pub rotate_on_membership_change: bool,
}

pub struct KeyStore {
    cipher: Arc<dyn SymmetricCipher>,
    slots: Mutex<HashMap<ConversationId, Arc<Mutex<Slot>>>>,
}

impl KeyStore {
    pub fn new(cipher: Arc<dyn SymmetricCipher>) -> Self {
        Self { cipher, slots: Mutex::new(HashMap::new()) }
    }

    pub fn from_config(config: &KeyStoreConfig) -> Self {
        Self::new(Arc::new(AeadCipher::new(config.algorithm)))
    }

    /// Symmetric capability keys from this store are used with.
    pub fn cipher(&self) -> &dyn SymmetricCipher {
        self.cipher.as_ref()
    }

    fn slot(&self, conv: &ConversationId) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(conv.clone()).or_default())
    }

    fn existing_slot(&self, conv: &ConversationId) -> Option<Arc<Mutex<Slot>>> {
        self.slots.lock().get(conv).cloned()
    }

    /// Runs `f` with the conversation's slot locked.
    fn with_slot<T>(
        &self,
        conv: &ConversationId,
        f: impl FnOnce(&mut Slot) -> Result<T, KeyStoreError>,
    ) -> Result<T, KeyStoreError> {
        let slot = self.slot(conv);
        let mut guard = slot.lock();
        match self.existing_slot(conv) {
            Some(current) if Arc::ptr_eq(&current, &slot) => f(&mut guard),
            _ => Err(KeyStoreError::ConcurrentKeyConflict(conv.clone())),
        }
    }

    fn generate(&self, conv: &ConversationId) -> Result<SymmetricKey, KeyStoreError> {
        let key = self
            .cipher
            .generate()
            .map_err(|_| KeyStoreError::Generation(conv.clone()))?;
        tracing::info!(
            target: "sp_messenger",
            event = "key_generated",
            conversation = %conv,
            fingerprint = %key.fingerprint(),
            algorithm = key.algorithm().as_str()
        );
        Ok(key)
    }

    /// Cached key, if any. Never generates.
    pub fn get_key(&self, conv: &ConversationId) -> Option<SymmetricKey> {
        let slot = self.existing_slot(conv)?;
        let guard = slot.lock();
        guard.entry.as_ref().map(|e| e.key.clone())
    }

    /// Cached key, or a freshly generated one stored under the same lock.
    pub fn get_or_create_key(&self, conv: &ConversationId) -> Result<SymmetricKey, KeyStoreError> {
        self.with_slot(conv, |slot| {
            if let Some(entry) = &slot.entry {
                return Ok(entry.key.clone());
            }
            let key = self.generate(conv)?;
            slot.entry = Some(CachedKey::new(key.clone()));
            Ok(key)
        })
    }

    /// Cache `key` unless the conversation already has one.
    /// Returns whether it was stored.
    pub fn put_key(&self, conv: &ConversationId, key: SymmetricKey) -> bool {
        let slot = self.slot(conv);
        let mut guard = slot.lock();
        if guard.entry.is_some() {
            return false;
        }
        guard.entry = Some(CachedKey::new(key));
        true
    }

    /// Cache a key delivered by a peer, replacing a different cached key
    /// (the peer rotated). `holders` are the users the key was wrapped for.
    pub fn put_received_key(
        &self,
        conv: &ConversationId,
        key: SymmetricKey,
        holders: impl IntoIterator<Item = Id>,
    ) {
        let slot = self.slot(conv);
        let mut guard = slot.lock();
        let replace = match &guard.entry {
            Some(entry) if entry.key == key => false,
            Some(entry) => {
                tracing::debug!(
                    target: "sp_messenger",
                    event = "key_replaced",
                    conversation = %conv,
                    old_fingerprint = %entry.key.fingerprint(),
                    new_fingerprint = %key.fingerprint()
                );
                true
            }
            None => true,
        };
        if replace {
            guard.entry = Some(CachedKey::new(key));
        }
        if let Some(entry) = guard.entry.as_mut() {
            entry.holders.extend(holders);
        }
    }

    /// Drop the cached key so the next send generates and distributes a new
    /// one. Returns whether a key was cached.
    pub fn invalidate(&self, conv: &ConversationId) -> bool {
        let Some(slot) = self.existing_slot(conv) else {
            return false;
        };
        let mut guard = slot.lock();
        match guard.entry.take() {
            Some(entry) => {
                tracing::info!(
                    target: "sp_messenger",
                    event = "key_invalidated",
                    conversation = %conv,
                    fingerprint = %entry.key.fingerprint()
                );
                true
            }
            None => false,
        }
    }

    /// Key for one outbound message to `recipients`, decided atomically:
    /// generate when absent, rotate a group key when membership moved,
    /// and request wrapping whenever some recipient is not known to hold it.
    pub fn lease(
        &self,
        conv: &ConversationId,
        recipients: &BTreeSet<Id>,
        policy: LeasePolicy,
    ) -> Result<OutboundKey, KeyStoreError> {
        self.with_slot(conv, |slot| {
            let membership_moved = conv.is_group()
                && policy.rotate_on_membership_change
                && slot
                    .entry
                    .as_ref()
                    .and_then(|e| e.members.as_ref())
                    .is_some_and(|m| m != recipients);

            let origin = match &slot.entry {
                Some(_) if membership_moved => KeyOrigin::Rotated,
                Some(_) => KeyOrigin::Cached,
                None => KeyOrigin::Generated,
            };

            if origin != KeyOrigin::Cached {
                let key = self.generate(conv)?;
                if let (KeyOrigin::Rotated, Some(old)) = (origin, &slot.entry) {
                    tracing::info!(
                        target: "sp_messenger",
                        event = "key_rotated",
                        conversation = %conv,
                        old_fingerprint = %old.key.fingerprint(),
                        new_fingerprint = %key.fingerprint(),
                        members = recipients.len()
                    );
                }
                slot.entry = Some(CachedKey::new(key));
            }

            let Some(entry) = slot.entry.as_mut() else {
                return Err(KeyStoreError::ConcurrentKeyConflict(conv.clone()));
            };
            if conv.is_group() && entry.members.is_none() {
                entry.members = Some(recipients.clone());
            }
            let wrap = policy.always_wrap || !recipients.is_subset(&entry.holders);
            Ok(OutboundKey { key: entry.key.clone(), wrap, origin })
        })
    }

    /// Record that the key with `fingerprint` reached `recipients`. Ignored
    /// if the conversation has since moved to another key.
    pub fn mark_delivered<'a>(
        &self,
        conv: &ConversationId,
        fingerprint: &str,
        recipients: impl IntoIterator<Item = &'a Id>,
    ) {
        let Some(slot) = self.existing_slot(conv) else {
            return;
        };
        let mut guard = slot.lock();
        if let Some(entry) = guard.entry.as_mut() {
            if entry.key.fingerprint() == fingerprint {
                entry.holders.extend(recipients.into_iter().cloned());
            }
        }
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").field("conversations", &self.slots.lock().len()).finish()
    }
}
