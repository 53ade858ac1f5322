//! Shared types for tidelog.
//!
//! This crate defines the value types every other tidelog crate speaks:
//! the content [`Address`] under which entries and head-sets are stored,
//! and the [`LamportClock`] that orders entries across replicas.

mod clock;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use clock::LamportClock;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Content address of a stored object: `blake3(canonical_bytes)`.
///
/// Ordering is lexicographic over the raw bytes, which is the same order as
/// comparing the lowercase hex renderings.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Compute the address of arbitrary data with BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Error returned when parsing an [`Address`] from a hex string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// The string is not exactly 64 characters long.
    #[error("invalid address length: expected 64 hex characters, got {0}")]
    InvalidLength(usize),

    /// The string contains a non-hex character.
    #[error("invalid hex character at position {0}")]
    InvalidCharacter(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(AddressParseError::InvalidLength(s.len()));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| match e {
            hex::FromHexError::InvalidHexCharacter { index, .. } => {
                AddressParseError::InvalidCharacter(index)
            }
            _ => AddressParseError::InvalidLength(s.len()),
        })?;

        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
