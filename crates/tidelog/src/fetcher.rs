//! Bounded-concurrency graph fetch.
//!
//! [`EntryFetcher`] walks the entry DAG outward from a set of start
//! addresses, reading each entry from the blockstore at most once and
//! following both `next` and `refs` links. Reads run on a small worker pool
//! whose size is capped by [`FetchConfig::concurrency`].
//!
//! Missing, unreachable, undecodable, and timed-out blocks are dropped from
//! the result instead of failing the walk: a partial replica simply sees a
//! shorter history.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tidelog_store::BlockStore;
use tidelog_types::Address;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::FetchConfig;
use crate::entry::Entry;

/// Called once per fetched entry with its address, the entry, and the number
/// of entries collected so far by that walk.
pub type ProgressFn = Arc<dyn Fn(&Address, &Entry, usize) + Send + Sync>;

/// Reads connected sets of entries out of a blockstore.
#[derive(Clone)]
pub struct EntryFetcher {
    store: Arc<dyn BlockStore>,
    config: FetchConfig,
}

impl EntryFetcher {
    /// Create a fetcher over `store`.
    pub fn new(store: Arc<dyn BlockStore>, config: FetchConfig) -> Self {
        Self { store, config }
    }

    /// The fetch settings in use.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Collect entries reachable from `starts`.
    ///
    /// Stops once `length` entries are collected (`None` walks the whole
    /// reachable graph). Addresses in `exclude` are neither read nor
    /// descended into. No address is read twice and no more than
    /// `concurrency` reads are ever outstanding.
    #[tracing::instrument(skip(self, starts, exclude, progress), fields(starts = starts.len()))]
    pub async fn fetch_all(
        &self,
        starts: &[Address],
        length: Option<usize>,
        exclude: &HashSet<Address>,
        progress: Option<ProgressFn>,
    ) -> Vec<Entry> {
        let concurrency = self.config.concurrency.max(1);
        let timeout = self.config.timeout();

        let mut seen: HashSet<Address> = exclude.clone();
        let mut queue: VecDeque<Address> = VecDeque::new();
        for start in starts {
            if seen.insert(*start) {
                queue.push_back(*start);
            }
        }

        let mut results: Vec<Entry> = Vec::new();
        let mut tasks: JoinSet<(Address, Option<Entry>)> = JoinSet::new();
        let mut requested = 0usize;
        let mut processed = 0usize;

        loop {
            // Never launch more reads than could still fit under `length`.
            while tasks.len() < concurrency
                && length.is_none_or(|max| results.len() + tasks.len() < max)
            {
                let Some(address) = queue.pop_front() else {
                    break;
                };

                let store = Arc::clone(&self.store);
                requested += 1;
                tasks.spawn(async move {
                    let entry = read_entry(store.as_ref(), address, timeout).await;
                    (address, entry)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            processed += 1;

            let (address, entry) = match joined {
                Ok(done) => done,
                Err(e) => {
                    debug!(error = %e, "fetch task did not complete");
                    continue;
                }
            };
            let Some(entry) = entry else {
                continue;
            };

            for link in entry.next.iter().chain(entry.refs.iter()) {
                if seen.insert(*link) {
                    queue.push_back(*link);
                }
            }

            results.push(entry);
            if let Some(progress) = &progress
                && let Some(last) = results.last()
            {
                progress(&address, last, results.len());
            }
        }

        debug!(
            requested,
            processed,
            fetched = results.len(),
            "fetch finished"
        );

        results
    }

    /// Run [`fetch_all`](Self::fetch_all) independently for each start
    /// address and concatenate the results in start order.
    ///
    /// At most `concurrency` walks run at once. Results of different walks
    /// may overlap; callers deduplicate.
    #[tracing::instrument(skip(self, starts, exclude, progress), fields(starts = starts.len()))]
    pub async fn fetch_parallel(
        &self,
        starts: &[Address],
        length: Option<usize>,
        exclude: &HashSet<Address>,
        progress: Option<ProgressFn>,
    ) -> Vec<Entry> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let exclude = Arc::new(exclude.clone());
        let mut walks: JoinSet<(usize, Vec<Entry>)> = JoinSet::new();

        for (index, start) in starts.iter().copied().enumerate() {
            let fetcher = self.clone();
            let permits = Arc::clone(&permits);
            let exclude = Arc::clone(&exclude);
            let progress = progress.clone();

            walks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (index, Vec::new());
                };
                let entries = fetcher
                    .fetch_all(&[start], length, &exclude, progress)
                    .await;
                (index, entries)
            });
        }

        let mut done: Vec<(usize, Vec<Entry>)> = Vec::with_capacity(starts.len());
        while let Some(joined) = walks.join_next().await {
            match joined {
                Ok(walk) => done.push(walk),
                Err(e) => debug!(error = %e, "fetch walk did not complete"),
            }
        }

        done.sort_by_key(|(index, _)| *index);
        done.into_iter().flat_map(|(_, entries)| entries).collect()
    }
}

/// Read and decode one entry. Every failure mode resolves to `None`.
async fn read_entry(
    store: &dyn BlockStore,
    address: Address,
    timeout: Option<Duration>,
) -> Option<Entry> {
    let read = store.get(&address);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%address, ?limit, "entry read timed out");
                return None;
            }
        },
        None => read.await,
    };

    match result {
        Ok(Some(bytes)) => match Entry::decode(address, &bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(%address, error = %e, "skipping undecodable entry");
                None
            }
        },
        Ok(None) => {
            debug!(%address, "entry not in store");
            None
        }
        Err(e) => {
            debug!(%address, error = %e, "entry read failed");
            None
        }
    }
}
