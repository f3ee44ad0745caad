//! Entity identifiers.
//!
//! Textual form: `name@address`. A leading `#` marks a group:
//!
//!   alice@hub.example      user
//!   #rustaceans@hub.example group
//!
//! Both parts accept ASCII alphanumerics plus `_`, `-` and `.`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

const GROUP_MARKER: char = '#';
const MAX_PART_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id {
    kind: EntityKind,
    name: String,
    address: String,
}

impl Id {
    pub fn user(name: &str, address: &str) -> Result<Self, ProtoError> {
        Self::build(EntityKind::User, name, address)
    }

    pub fn group(name: &str, address: &str) -> Result<Self, ProtoError> {
        Self::build(EntityKind::Group, name, address)
    }

    fn build(kind: EntityKind, name: &str, address: &str) -> Result<Self, ProtoError> {
        validate_part(name, "name")?;
        validate_part(address, "address")?;
        Ok(Self { kind, name: name.to_string(), address: address.to_string() })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_group(&self) -> bool {
        self.kind == EntityKind::Group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn validate_part(part: &str, what: &str) -> Result<(), ProtoError> {
    if part.is_empty() {
        return Err(ProtoError::InvalidId(format!("empty {what}")));
    }
    if part.len() > MAX_PART_LEN {
        return Err(ProtoError::InvalidId(format!("{what} longer than {MAX_PART_LEN} bytes")));
    }
    let legal = |c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if let Some(c) = part.chars().find(|c| !legal(c)) {
        return Err(ProtoError::InvalidId(format!("illegal character {c:?} in {what}")));
    }
    Ok(())
}

impl FromStr for Id {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = match s.strip_prefix(GROUP_MARKER) {
            Some(rest) => (EntityKind::Group, rest),
            None => (EntityKind::User, s),
        };
        let (name, address) = rest
            .split_once('@')
            .ok_or_else(|| ProtoError::InvalidId(format!("`{s}` is missing '@'")))?;
        Self::build(kind, name, address)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_group() {
            write!(f, "{GROUP_MARKER}")?;
        }
        write!(f, "{}@{}", self.name, self.address)
    }
}

impl Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
