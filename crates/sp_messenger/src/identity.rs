//! Identity collaborators: who we are, and where public keys and group
//! memberships come from.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use sp_crypto::{IdentityKeyPair, PublicKeyBytes};
use sp_proto::{Id, ProtoError};

/// Resolves public keys and group memberships.
pub trait IdentityResolver: Send + Sync {
    fn public_key(&self, id: &Id) -> Option<PublicKeyBytes>;
    /// Current members of `group`, or `None` if the group is unknown.
    fn members(&self, group: &Id) -> Option<Vec<Id>>;
}

/// The user this messenger session acts for.
#[derive(Debug)]
pub struct LocalUser {
    id: Id,
    keys: IdentityKeyPair,
}

impl LocalUser {
    pub fn new(id: Id, keys: IdentityKeyPair) -> Result<Self, ProtoError> {
        if id.is_group() {
            return Err(ProtoError::InvalidId(format!("{id} is a group, not a user")));
        }
        Ok(Self { id, keys })
    }

    pub fn generate(id: Id) -> Result<Self, ProtoError> {
        Self::new(id, IdentityKeyPair::generate())
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn keys(&self) -> &IdentityKeyPair {
        &self.keys
    }

    pub fn public_key(&self) -> &PublicKeyBytes {
        &self.keys.public
    }
}

/// In-memory resolver.
#[derive(Debug, Default)]
pub struct Directory {
    keys: RwLock<HashMap<Id, PublicKeyBytes>>,
    groups: RwLock<HashMap<Id, BTreeSet<Id>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Id, public_key: PublicKeyBytes) {
        self.keys.write().insert(id, public_key);
    }

    pub fn register_user(&self, user: &LocalUser) {
        self.register(user.id().clone(), user.public_key().clone());
    }

    pub fn forget(&self, id: &Id) {
        self.keys.write().remove(id);
    }

    pub fn set_members(&self, group: Id, members: impl IntoIterator<Item = Id>) {
        self.groups.write().insert(group, members.into_iter().collect());
    }

    pub fn add_member(&self, group: &Id, member: Id) {
        self.groups.write().entry(group.clone()).or_default().insert(member);
    }

    pub fn remove_member(&self, group: &Id, member: &Id) {
        if let Some(members) = self.groups.write().get_mut(group) {
            members.remove(member);
        }
    }
}

impl IdentityResolver for Directory {
    fn public_key(&self, id: &Id) -> Option<PublicKeyBytes> {
        self.keys.read().get(id).cloned()
    }

    fn members(&self, group: &Id) -> Option<Vec<Id>> {
        self.groups.read().get(group).map(|m| m.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    #[test]
    fn local_user_must_not_be_group() {
        assert!(LocalUser::generate(id("#team@hub")).is_err());
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        assert_eq!(alice.public_key(), &alice.keys().public);
    }

    #[test]
    fn directory_tracks_keys_and_members() {
        let dir = Directory::new();
        let alice = LocalUser::generate(id("alice@hub")).unwrap();
        dir.register_user(&alice);
        assert_eq!(dir.public_key(alice.id()), Some(alice.public_key().clone()));
        dir.forget(alice.id());
        assert!(dir.public_key(alice.id()).is_none());

        let team = id("#team@hub");
        assert!(dir.members(&team).is_none());
        dir.set_members(team.clone(), [id("bob@hub"), id("alice@hub")]);
        dir.add_member(&team, id("carol@hub"));
        dir.remove_member(&team, &id("bob@hub"));
        assert_eq!(dir.members(&team).unwrap(), vec![id("alice@hub"), id("carol@hub")]);
    }
}
