//! In-memory blockstore backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tidelog_types::Address;
use tracing::trace;

use crate::error::StoreError;
use crate::traits::BlockStore;

/// In-memory blockstore backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for replicas that keep their history in memory only.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Address, Bytes>>,
}

impl MemoryBlockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the bytes stored under `address` without re-addressing them.
    ///
    /// Breaks content addressing on purpose; only fault-injection tests
    /// should call this.
    pub fn corrupt(&self, address: Address, data: Bytes) {
        self.blocks
            .write()
            .expect("lock poisoned")
            .insert(address, data);
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        let address = Address::from_data(&data);
        let mut map = self.blocks.write().expect("lock poisoned");

        if !map.contains_key(&address) {
            trace!(%address, size = data.len(), "storing block in memory");
            map.insert(address, data);
        }

        Ok(address)
    }

    async fn get(&self, address: &Address) -> Result<Option<Bytes>, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(address).cloned())
    }

    async fn contains(&self, address: &Address) -> Result<bool, StoreError> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(address))
    }
}
