//! Append-only, signed, hash-linked event log that merges as a CRDT.
//!
//! A [`Log`] is a Merkle-DAG of [`Entry`] values stored in a content-addressed
//! [`BlockStore`](tidelog_store::BlockStore). Every entry is signed by its
//! writer's [`Identity`], points at the heads it was appended on (`next`),
//! and at a few older ancestors (`refs`) so partial replicas reach deep
//! history in fewer reads.
//!
//! Replicas append locally and [`join`](Log::join) each other's logs without
//! coordination. Join is set union over entries, so it is commutative,
//! associative, and idempotent; the order of `values` and `heads` is derived
//! from the set with Lamport clocks and a deterministic tie-break
//! ([`sorting`]).
//!
//! Logs are persisted as a small head-set object and reloaded, fully or
//! partially, with [`LogCodec`], which walks the DAG with the
//! bounded-concurrency [`EntryFetcher`].

mod access;
mod codec;
mod config;
mod entry;
mod error;
mod fetcher;
mod identity;
mod log;
pub mod sorting;

#[cfg(test)]
mod tests;

pub use access::{AccessController, AllowAll, WriteAccess};
pub use codec::{HeadSet, LoadedEntries, LoadedLog, LogCodec};
pub use config::{AppendConfig, FetchConfig, LogConfig};
pub use entry::{ENTRY_VERSION, Entry, EntryBuilder};
pub use error::LogError;
pub use fetcher::{EntryFetcher, ProgressFn};
pub use identity::{Ed25519Keystore, Identity, IdentityProvider, IdentitySignatures};
pub use log::{IterOptions, JoinOutcome, LoadOptions, Log, LogBuilder, Snapshot};
pub use sorting::SortFn;
