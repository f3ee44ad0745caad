//! Messenger configuration.
//!
//! Loaded from JSON (all fields optional, missing ones take defaults) and
//! then overridable from the environment:
//!
//!   SP_KEY_ALGORITHM               xchacha20poly1305 | aes256gcm
//!   SP_KEY_WRAP_POLICY             abort | best_effort
//!   SP_ALWAYS_WRAP_KEY             true | false
//!   SP_ROTATE_ON_MEMBERSHIP_CHANGE true | false
//!   SP_PADDING_MODE                none | buckets | maximum

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sp_crypto::SymmetricAlgorithm;
use sp_proto::PaddingMode;

use crate::error::ConfigError;

/// What to do when the content key cannot be wrapped for some group members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyWrapPolicy {
    /// Fail the whole send.
    #[default]
    Abort,
    /// Deliver to the members that could be wrapped for; report the rest.
    BestEffort,
}

impl FromStr for KeyWrapPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            _ => Err(ConfigError::UnknownKeyWrapPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    pub algorithm: SymmetricAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransceiverConfig {
    pub key_wrap_policy: KeyWrapPolicy,
    /// Attach the wrapped key to every message, not just the first.
    pub always_wrap_key: bool,
    /// Generate a fresh group key when membership differs from the
    /// snapshot the cached key was distributed to.
    pub rotate_on_membership_change: bool,
    pub padding: PaddingMode,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            key_wrap_policy: KeyWrapPolicy::Abort,
            always_wrap_key: false,
            rotate_on_membership_change: true,
            padding: PaddingMode::Buckets,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    pub key_store: KeyStoreConfig,
    pub transceiver: TransceiverConfig,
}

impl MessengerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `SP_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("SP_KEY_ALGORITHM") {
            self.key_store.algorithm =
                v.parse().map_err(|_| invalid("SP_KEY_ALGORITHM", &v))?;
        }
        if let Some(v) = lookup("SP_KEY_WRAP_POLICY") {
            self.transceiver.key_wrap_policy =
                v.parse().map_err(|_| invalid("SP_KEY_WRAP_POLICY", &v))?;
        }
        if let Some(v) = lookup("SP_ALWAYS_WRAP_KEY") {
            self.transceiver.always_wrap_key = parse_bool("SP_ALWAYS_WRAP_KEY", &v)?;
        }
        if let Some(v) = lookup("SP_ROTATE_ON_MEMBERSHIP_CHANGE") {
            self.transceiver.rotate_on_membership_change =
                parse_bool("SP_ROTATE_ON_MEMBERSHIP_CHANGE", &v)?;
        }
        if let Some(v) = lookup("SP_PADDING_MODE") {
            self.transceiver.padding = v.parse().map_err(|_| invalid("SP_PADDING_MODE", &v))?;
        }
        Ok(self)
    }
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { var, value: value.to_string() }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value)),
    }
}
