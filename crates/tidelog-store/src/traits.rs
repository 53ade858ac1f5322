//! Core trait for content-addressed block storage.

use bytes::Bytes;
use tidelog_types::Address;

use crate::error::StoreError;

/// Content-addressed block storage.
///
/// `put` returns `blake3(data)` as the block's [`Address`]; writing the same
/// bytes twice yields the same address and is a no-op. Blocks are immutable
/// once written, so implementations must tolerate concurrent readers.
///
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block and return its content address.
    async fn put(&self, data: Bytes) -> Result<Address, StoreError>;

    /// Retrieve a block by address. Returns `None` if not found.
    async fn get(&self, address: &Address) -> Result<Option<Bytes>, StoreError>;

    /// Check whether a block exists.
    async fn contains(&self, address: &Address) -> Result<bool, StoreError>;
}
