//! Shared test harness for tidelog integration tests.
//!
//! Provides [`ReplicaNetwork`]: N replicas of one log stream over a shared
//! in-memory blockstore. Each replica reads the store through its own
//! [`SlowStore`] view so tests can make blocks unreachable for one replica
//! only. Replicas exchange state the way real peers do: the sender
//! publishes its head-set, the receiver loads it and joins.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tidelog::{Ed25519Keystore, Entry, JoinOutcome, LoadOptions, Log, LogConfig, LogError};
use tidelog_store::{BlockStore, MemoryBlockStore, SlowStore};
use tidelog_types::Address;

/// A set of replicas of the same log stream.
pub struct ReplicaNetwork {
    store: Arc<MemoryBlockStore>,
    keystore: Arc<Ed25519Keystore>,
    views: Vec<Arc<SlowStore>>,
    replicas: Vec<Log>,
    rng: StdRng,
}

impl ReplicaNetwork {
    /// `n` empty replicas of stream `log_id`, writer `i` seeded with `i + 1`.
    pub fn new(n: usize, log_id: &str) -> Self {
        Self::with_config(n, log_id, LogConfig::default())
    }

    /// Like [`new`](Self::new) with an explicit log config for every replica.
    pub fn with_config(n: usize, log_id: &str, config: LogConfig) -> Self {
        let store = Arc::new(MemoryBlockStore::new());
        let keystore = Arc::new(Ed25519Keystore::new());

        let mut views = Vec::with_capacity(n);
        let mut replicas = Vec::with_capacity(n);
        for i in 0..n {
            let view = Arc::new(SlowStore::new(store.clone()));
            let identity = keystore.identity_from_seed(&format!("replica-{i}"), [i as u8 + 1; 32]);
            let log = Log::builder(view.clone(), identity, keystore.clone())
                .id(log_id)
                .config(config.clone())
                .build();
            views.push(view);
            replicas.push(log);
        }

        Self {
            store,
            keystore,
            views,
            replicas,
            rng: StdRng::seed_from_u64(42),
        }
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Whether the network has no replicas.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Replica `i`.
    pub fn replica(&self, i: usize) -> &Log {
        &self.replicas[i]
    }

    /// Mutable replica `i`.
    pub fn replica_mut(&mut self, i: usize) -> &mut Log {
        &mut self.replicas[i]
    }

    /// The shared blockstore.
    pub fn store(&self) -> &Arc<MemoryBlockStore> {
        &self.store
    }

    /// Append `payload` on replica `i`.
    pub async fn append(&mut self, i: usize, payload: &str) -> Entry {
        self.replicas[i]
            .append(payload)
            .await
            .expect("append failed")
    }

    /// Append `count` payloads `"r<i>-<n>"` on replica `i`.
    pub async fn append_n(&mut self, i: usize, count: usize) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(count);
        for n in 1..=count {
            entries.push(self.append(i, &format!("r{i}-{n}")).await);
        }
        entries
    }

    /// Make `address` unreachable when replica `i` reads the store.
    pub fn make_unreachable(&self, i: usize, address: Address) {
        self.views[i].fail(address);
    }

    /// Load replica `from`'s published head-set as replica `to` sees it.
    pub async fn load_remote(
        &self,
        from: usize,
        to: usize,
        length: Option<usize>,
    ) -> Result<Log, LogError> {
        let address = self.replicas[from].to_address().await?;
        let identity = self.replicas[to].identity().clone();
        let exclude: HashSet<Address> = self.replicas[to].entries().map(|e| e.hash).collect();

        let view: Arc<dyn BlockStore> = self.views[to].clone();
        Log::from_address(
            view,
            identity,
            self.keystore.clone(),
            &address,
            LoadOptions {
                length,
                exclude,
                config: self.replicas[to].config().clone(),
                ..Default::default()
            },
        )
        .await
    }

    /// Send replica `from`'s history to replica `to` and merge it there.
    pub async fn sync(&mut self, from: usize, to: usize) -> Result<JoinOutcome, LogError> {
        if self.replicas[from].is_empty() {
            return Ok(JoinOutcome::Merged { added: 0 });
        }

        let remote = self.load_remote(from, to, None).await?;
        self.replicas[to].join(&remote, None).await
    }

    /// Fetch the history behind replica `i`'s tail hashes and merge it.
    ///
    /// Returns the number of entries added.
    pub async fn fill_gaps(&mut self, i: usize) -> Result<usize, LogError> {
        let mut added = 0;
        for hash in self.replicas[i].tail_hashes() {
            let exclude: HashSet<Address> = self.replicas[i].entries().map(|e| e.hash).collect();
            let view: Arc<dyn BlockStore> = self.views[i].clone();
            let older = Log::from_entry_hash(
                view,
                self.replicas[i].identity().clone(),
                self.keystore.clone(),
                &hash,
                self.replicas[i].id(),
                LoadOptions {
                    exclude,
                    config: self.replicas[i].config().clone(),
                    ..Default::default()
                },
            )
            .await?;
            added += self.replicas[i].join_strict(&older, None).await?;
        }
        Ok(added)
    }

    /// Sync every ordered pair of replicas once, in a shuffled order.
    pub async fn gossip_round(&mut self) {
        let n = self.replicas.len();
        let mut pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|from| (0..n).map(move |to| (from, to)))
            .filter(|(from, to)| from != to)
            .collect();

        for i in (1..pairs.len()).rev() {
            let j = self.rng.random_range(0..=i);
            pairs.swap(i, j);
        }

        for (from, to) in pairs {
            self.sync(from, to).await.expect("sync failed");
        }
    }

    /// Addresses held by replica `i`.
    pub fn entry_set(&self, i: usize) -> BTreeSet<Address> {
        self.replicas[i].entries().map(|e| e.hash).collect()
    }

    /// Whether every replica holds the same entries in the same order.
    pub fn converged(&self) -> bool {
        let Some(first) = self.replicas.first() else {
            return true;
        };
        let order: Vec<Address> = first.values().iter().map(|e| e.hash).collect();

        self.replicas
            .iter()
            .all(|log| log.values().iter().map(|e| e.hash).collect::<Vec<_>>() == order)
    }
}

/// Payload bytes as a string.
pub fn payload_str(entry: &Entry) -> String {
    String::from_utf8_lossy(&entry.payload).into_owned()
}

/// Install a tracing subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
