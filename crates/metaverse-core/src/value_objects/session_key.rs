//! Session key - opaque identity of a user or domain session
//!
//! User keys and domain keys live in independent registries, so the same
//! string may name both a user and a domain without conflict.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::PresenceError;

/// Validated identity string used as a registry key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Maximum key length in bytes
    pub const MAX_LEN: usize = 256;

    /// Validate and wrap an identity string
    ///
    /// Empty, whitespace-only, oversized, or control-character keys are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self, PresenceError> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw.len() > Self::MAX_LEN || raw.chars().any(char::is_control)
        {
            return Err(PresenceError::InvalidKey(raw));
        }
        Ok(Self(raw))
    }

    /// Get the key as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionKey {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = PresenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SessionKey {
    type Error = PresenceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
