//! Error types for the tidelog crate.

use tidelog_store::StoreError;
use tidelog_types::Address;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// An entry or log was built without a signing identity.
    #[error("identity is required")]
    IdentityRequired,

    /// An entry was built without a payload.
    #[error("entry requires data")]
    EntryDataRequired,

    /// Attempted to serialize a log that holds no entries.
    #[error("can't serialize an empty log")]
    EmptyLog,

    /// The object read from the store is not a serialized log.
    #[error("given argument is not an instance of a log")]
    NotALog,

    /// The access controller rejected an entry.
    #[error("could not append entry, key {identity:?} is not allowed to write to the log")]
    AppendNotPermitted {
        /// Id of the identity that signed the rejected entry.
        identity: String,
    },

    /// An entry's signature does not verify against its signer's key.
    #[error("could not validate signature for entry {hash} and key {public_key}")]
    SignatureInvalid {
        /// Address of the offending entry.
        hash: Address,
        /// Hex of the signer's public key.
        public_key: String,
    },

    /// An entry's content does not hash to its address.
    #[error("entry content does not match its address {0}")]
    InvalidHash(Address),

    /// An entry carries no signature.
    #[error("entry {0} has no signature")]
    MissingSignature(Address),

    /// An entry carries no signer identity.
    #[error("entry {0} has no identity")]
    MissingIdentity(Address),

    /// Two logs with different stream ids were asked to merge.
    #[error("can't join logs with different ids: expected {expected:?}, got {actual:?}")]
    DifferentLogId {
        /// Id of the receiving log.
        expected: String,
        /// Id of the log that was offered.
        actual: String,
    },

    /// The clock has no time left to advance to.
    #[error("lamport clock overflow: no time after {0}")]
    ClockOverflow(u64),

    /// An address given to a range query is not in the log.
    #[error("entry not found: {0}")]
    EntryNotFound(Address),

    /// The identity provider failed to produce a signature.
    #[error("signing error: {0}")]
    Signing(String),

    /// Blockstore error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Bytes read from the store could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl From<postcard::Error> for LogError {
    fn from(e: postcard::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
