//! Type-safe world identifier.
//!
//! A world id is an opaque string of 1 to 64 characters drawn from ASCII
//! letters, digits, underscore, and hyphen. Every boundary that accepts a
//! world id (routing, ingestion, introspection) runs the candidate through
//! [`WorldId::coerce`], which substitutes a fallback instead of failing.

use serde::{Deserialize, Serialize};

/// The world used when nothing else is configured.
pub const DEFAULT_WORLD_ID: &str = "world_1";

/// Maximum length of a world id, in bytes.
pub const MAX_WORLD_ID_LEN: usize = 64;

/// Validated identifier of an independent simulation world.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorldId(String);

impl WorldId {
    /// Parse a candidate, returning `None` if it violates the shape rule.
    ///
    /// Surrounding whitespace is trimmed before validation.
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim();
        is_valid_world_id(candidate).then(|| Self(candidate.to_owned()))
    }

    /// Coerce an optional candidate, substituting `fallback` when the
    /// candidate is absent, blank, or malformed.
    pub fn coerce(raw: Option<&str>, fallback: &Self) -> Self {
        raw.and_then(Self::parse)
            .unwrap_or_else(|| fallback.clone())
    }

    /// Coerce a configured default, falling back to [`DEFAULT_WORLD_ID`].
    pub fn default_from(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self(DEFAULT_WORLD_ID.to_owned())
    }
}

impl core::fmt::Display for WorldId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorldId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorldId {
    type Error = InvalidWorldId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_world_id(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidWorldId(value))
        }
    }
}

impl From<WorldId> for String {
    fn from(id: WorldId) -> Self {
        id.0
    }
}

/// A string that does not satisfy the world id shape rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWorldId(pub String);

impl core::fmt::Display for InvalidWorldId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "invalid world id: {:?}", self.0)
    }
}

impl std::error::Error for InvalidWorldId {}

/// Check the shape rule: `^[A-Za-z0-9_-]{1,64}$`.
pub fn is_valid_world_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_WORLD_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
