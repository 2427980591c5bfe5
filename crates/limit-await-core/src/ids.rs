//! Identifier types for cluster objects.
//!
//! Node names follow the Kubernetes DNS subdomain rules. Pod UIDs are opaque
//! strings assigned by the API server; only emptiness and length are checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a DNS subdomain name.
const MAX_NODE_NAME_LEN: usize = 253;

/// Maximum length accepted for a pod UID.
const MAX_UID_LEN: usize = 128;

/// Errors produced when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// Which identifier failed.
        kind: &'static str,
    },

    /// The identifier exceeded its maximum length.
    #[error("{kind} too long: {got} > {max}")]
    TooLong {
        /// Which identifier failed.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        got: usize,
    },

    /// The identifier contained a character outside its alphabet.
    #[error("{kind} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// Which identifier failed.
        kind: &'static str,
        /// The offending character.
        ch: char,
    },

    /// The identifier must start and end with an alphanumeric character.
    #[error("{kind} must start and end with an alphanumeric character")]
    InvalidBoundary {
        /// Which identifier failed.
        kind: &'static str,
    },
}

/// The name of a cluster node.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// Parse and validate a node name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than 253 characters,
    /// or not a lowercase DNS subdomain.
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        const KIND: &str = "node name";
        let name = name.into();

        if name.is_empty() {
            return Err(IdError::Empty { kind: KIND });
        }
        if name.len() > MAX_NODE_NAME_LEN {
            return Err(IdError::TooLong {
                kind: KIND,
                max: MAX_NODE_NAME_LEN,
                got: name.len(),
            });
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
        {
            return Err(IdError::InvalidCharacter { kind: KIND, ch });
        }
        let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
        if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
            return Err(IdError::InvalidBoundary { kind: KIND });
        }

        Ok(Self(name))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeName({})", self.0)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The unique identifier the API server assigns to a pod.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PodUid(String);

impl PodUid {
    /// Parse and validate a pod UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the UID is empty, too long, or contains whitespace.
    pub fn new(uid: impl Into<String>) -> Result<Self, IdError> {
        const KIND: &str = "pod uid";
        let uid = uid.into();

        if uid.is_empty() {
            return Err(IdError::Empty { kind: KIND });
        }
        if uid.len() > MAX_UID_LEN {
            return Err(IdError::TooLong {
                kind: KIND,
                max: MAX_UID_LEN,
                got: uid.len(),
            });
        }
        if let Some(ch) = uid.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdError::InvalidCharacter { kind: KIND, ch });
        }

        Ok(Self(uid))
    }

    /// Return the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PodUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PodUid({})", self.0)
    }
}

impl fmt::Display for PodUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PodUid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PodUid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PodUid> for String {
    fn from(uid: PodUid) -> Self {
        uid.0
    }
}
