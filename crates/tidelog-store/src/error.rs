//! Error types for blockstore operations.

use tidelog_types::Address;

/// Errors that can occur during blockstore operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block is not held by the store.
    #[error("block not found: {0}")]
    NotFound(Address),

    /// The block is known to exist but cannot be reached right now.
    #[error("block unreachable: {0}")]
    Unreachable(Address),
}
