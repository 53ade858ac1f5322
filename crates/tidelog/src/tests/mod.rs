//! Tests for the tidelog crate.


use std::sync::Arc;

use tidelog_store::{BlockStore, MemoryBlockStore};

use crate::entry::Entry;
use crate::identity::{Ed25519Keystore, Identity};
use crate::log::Log;

/// Deterministic identity `user-<seed>` registered in `keystore`.
fn test_identity(keystore: &Ed25519Keystore, seed: u8) -> Identity {
    keystore.identity_from_seed(&format!("user-{seed}"), [seed; 32])
}

/// Empty log of stream `id`, writing as `user-<seed>`.
fn test_log(
    store: &Arc<MemoryBlockStore>,
    keystore: &Arc<Ed25519Keystore>,
    seed: u8,
    id: &str,
) -> Log {
    let identity = test_identity(keystore, seed);
    Log::builder(store.clone(), identity, keystore.clone())
        .id(id)
        .build()
}

/// Append `count` payloads `"<prefix><n>"` (1-based) and return the entries.
async fn append_n(log: &mut Log, prefix: &str, count: usize) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(count);
    for n in 1..=count {
        entries.push(log.append(format!("{prefix}{n}")).await.unwrap());
    }
    entries
}

/// Payloads as strings, in the order given.
fn payloads<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| String::from_utf8_lossy(&e.payload).into_owned())
        .collect()
}

fn as_dyn(store: &Arc<MemoryBlockStore>) -> Arc<dyn BlockStore> {
    store.clone()
}

/// Install a tracing subscriber honouring `RUST_LOG`, once per process.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
