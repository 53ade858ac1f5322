//! Persisting a log's head-set and reconstructing logs from the blockstore.
//!
//! A log is saved as a small head-set object, `{ id, heads }`, next to its
//! entries. Loading reverses that: read the head-set, walk the DAG from the
//! heads with the [`EntryFetcher`], and keep the newest `length` entries.
//! Loading can also start from an arbitrary entry address or from entries
//! already in hand, for replicas that want only part of someone's history.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tidelog_store::{BlockStore, StoreError};
use tidelog_types::{Address, LamportClock};
use tracing::debug;

use crate::config::FetchConfig;
use crate::entry::Entry;
use crate::error::LogError;
use crate::fetcher::{EntryFetcher, ProgressFn};
use crate::log::Log;
use crate::sorting::last_write_wins;

/// Marks a stored block as a head-set rather than an entry.
const HEAD_SET_MAGIC: [u8; 4] = *b"TLHS";

/// The persisted description of a log: its stream id and current heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadSet {
    /// Log stream id.
    pub id: String,
    /// Head addresses, most recent first.
    pub heads: Vec<Address>,
}

#[derive(Serialize, Deserialize)]
struct HeadSetRecord {
    magic: [u8; 4],
    id: String,
    heads: Vec<Address>,
}

/// A log reconstructed from its head-set.
#[derive(Debug, Clone)]
pub struct LoadedLog {
    /// Stream id from the head-set.
    pub id: String,
    /// Kept entries, oldest first by [`Entry::compare`].
    pub values: Vec<Entry>,
    /// Kept entries whose address was listed in the head-set.
    pub heads: Vec<Entry>,
    /// Highest clock time among fetched entries, owned by the stream id.
    pub clock: LamportClock,
}

/// Entries reconstructed from entries already in hand.
#[derive(Debug, Clone)]
pub struct LoadedEntries {
    /// Stream id of the newest kept entry, if any were kept.
    pub id: Option<String>,
    /// Kept entries, with the source entries first.
    pub values: Vec<Entry>,
}

/// Reads and writes logs through a blockstore.
#[derive(Clone)]
pub struct LogCodec {
    store: Arc<dyn BlockStore>,
    fetcher: EntryFetcher,
}

impl LogCodec {
    /// Create a codec over `store`, fetching with `config`.
    pub fn new(store: Arc<dyn BlockStore>, config: FetchConfig) -> Self {
        let fetcher = EntryFetcher::new(Arc::clone(&store), config);
        Self { store, fetcher }
    }

    /// Write the log's head-set and return its address.
    ///
    /// Heads are recorded most recent first.
    #[tracing::instrument(skip(self, log), fields(id = %log.id()))]
    pub async fn to_address(&self, log: &Log) -> Result<Address, LogError> {
        if log.is_empty() {
            return Err(LogError::EmptyLog);
        }

        let mut heads: Vec<&Entry> = log.heads();
        heads.sort_by(|a, b| last_write_wins(a, b));
        heads.reverse();

        let record = HeadSetRecord {
            magic: HEAD_SET_MAGIC,
            id: log.id().to_string(),
            heads: heads.iter().map(|e| e.hash).collect(),
        };
        let bytes = postcard::to_allocvec(&record)?;
        let address = self.store.put(Bytes::from(bytes)).await?;

        debug!(%address, heads = record.heads.len(), "wrote head-set");
        Ok(address)
    }

    /// Read the head-set stored at `address`.
    pub async fn read_head_set(&self, address: &Address) -> Result<HeadSet, LogError> {
        let bytes = self
            .store
            .get(address)
            .await?
            .ok_or(StoreError::NotFound(*address))?;

        let record: HeadSetRecord = postcard::from_bytes(&bytes).map_err(|_| LogError::NotALog)?;
        if record.magic != HEAD_SET_MAGIC || record.id.is_empty() {
            return Err(LogError::NotALog);
        }

        Ok(HeadSet {
            id: record.id,
            heads: record.heads,
        })
    }

    /// Reconstruct a log from the head-set at `address`.
    ///
    /// With `length` set, only the newest `length` entries are kept and the
    /// heads are the kept entries named by the head-set.
    #[tracing::instrument(skip(self, exclude, progress))]
    pub async fn from_address(
        &self,
        address: &Address,
        length: Option<usize>,
        exclude: &HashSet<Address>,
        progress: Option<ProgressFn>,
    ) -> Result<LoadedLog, LogError> {
        let head_set = self.read_head_set(address).await?;
        let fetched = self
            .fetcher
            .fetch_parallel(&head_set.heads, length, exclude, progress)
            .await;

        let mut entries = dedup(fetched);
        let max_time = entries.iter().map(|e| e.clock.time).max().unwrap_or(0);
        let clock = LamportClock::new(head_set.id.clone(), max_time);

        entries.sort_by(Entry::compare);
        let values = keep_last(entries, length);

        let head_addresses: BTreeSet<Address> = head_set.heads.iter().copied().collect();
        let heads = values
            .iter()
            .filter(|e| head_addresses.contains(&e.hash))
            .cloned()
            .collect();

        debug!(id = %head_set.id, values = values.len(), "loaded log from head-set");

        Ok(LoadedLog {
            id: head_set.id,
            values,
            heads,
            clock,
        })
    }

    /// Collect entries reachable from a single entry address.
    ///
    /// `length` is clamped to at least one. Entries come back oldest first.
    #[tracing::instrument(skip(self, exclude, progress))]
    pub async fn from_entry_hash(
        &self,
        hash: &Address,
        length: Option<usize>,
        exclude: &HashSet<Address>,
        progress: Option<ProgressFn>,
    ) -> Vec<Entry> {
        let length = length.map(|n| n.max(1));
        let fetched = self
            .fetcher
            .fetch_all(&[*hash], length, exclude, progress)
            .await;

        let mut entries = dedup(fetched);
        entries.sort_by(Entry::compare);
        keep_last(entries, length)
    }

    /// Collect entries reachable from `sources`, keeping every source.
    ///
    /// `length` is raised to at least the number of sources. Sources the
    /// newest-`length` window would have dropped are put back at the front
    /// of the window in place of its oldest entries.
    #[tracing::instrument(skip(self, sources, exclude, progress), fields(sources = sources.len()))]
    pub async fn from_entry(
        &self,
        sources: &[Entry],
        length: Option<usize>,
        exclude: &HashSet<Address>,
        progress: Option<ProgressFn>,
    ) -> LoadedEntries {
        let length = length.map(|n| n.max(sources.len()));

        let starts: Vec<Address> = sources
            .iter()
            .flat_map(|e| e.next.iter().chain(e.refs.iter()))
            .copied()
            .collect();

        // Sources are in hand already; don't read them back.
        let mut skip = exclude.clone();
        skip.extend(sources.iter().map(|e| e.hash));

        let fetched = self
            .fetcher
            .fetch_parallel(&starts, length, &skip, progress)
            .await;

        let known: Vec<Entry> = sources.iter().cloned().chain(fetched).collect();
        let mut entries = dedup(known);
        entries.sort_by(Entry::compare);
        let window = keep_last(entries, length);

        let missing: Vec<Entry> = dedup(
            sources
                .iter()
                .filter(|s| !window.iter().any(|e| e.hash == s.hash))
                .cloned()
                .collect(),
        );

        let mut values = missing.clone();
        values.extend(window.into_iter().skip(missing.len()));

        LoadedEntries {
            id: values.last().map(|e| e.log_id.clone()),
            values,
        }
    }
}

/// Drop repeated addresses, keeping first occurrences in order.
fn dedup(entries: Vec<Entry>) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.hash))
        .collect()
}

/// Keep the last `length` entries of a sorted vector.
fn keep_last(mut entries: Vec<Entry>, length: Option<usize>) -> Vec<Entry> {
    if let Some(n) = length
        && entries.len() > n
    {
        entries.drain(..entries.len() - n);
    }
    entries
}
