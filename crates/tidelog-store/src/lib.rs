//! Blockstore capability and backend implementations.
//!
//! This crate defines the [`BlockStore`] trait through which tidelog reads
//! and writes entries and head-sets, along with two concrete backends:
//!
//! - [`MemoryBlockStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`SlowStore`]: a wrapper injecting latency and unreachable blocks, for
//!   exercising partial-failure paths.

mod error;
mod memory_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use memory_store::MemoryBlockStore;
pub use slow_store::SlowStore;
pub use traits::BlockStore;
