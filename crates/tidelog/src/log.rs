//! The log: an index of entries plus its head frontier and Lamport clock.
//!
//! A [`Log`] owns three views over the same entry set:
//!
//! - `entries`: every known entry by address,
//! - `heads`: entries no known entry points at through `next`,
//! - `nexts`: every address some known entry points at through `next`.
//!
//! [`Log::append`] and [`Log::join`] are the only mutators. Both validate
//! everything first and touch the indexes only once nothing can fail, so an
//! error always leaves the log as it was. Order is never stored; `values`
//! and `heads` are re-derived from the set with the log's [`SortFn`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tidelog_store::BlockStore;
use tidelog_types::{Address, LamportClock};
use tracing::{debug, warn};

use crate::access::{AccessController, AllowAll};
use crate::codec::LogCodec;
use crate::config::LogConfig;
use crate::entry::{Entry, EntryBuilder};
use crate::error::LogError;
use crate::fetcher::ProgressFn;
use crate::identity::{Identity, IdentityProvider};
use crate::sorting::{SortFn, last_write_wins};

/// Result of [`Log::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The logs share a stream id; `added` entries were new to this log.
    Merged {
        /// Number of entries added.
        added: usize,
    },
    /// The other log belongs to a different stream and was ignored.
    SkippedDifferentStream,
}

/// Bounds for [`Log::iter`]. All bounds are entry addresses.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Stop before this entry.
    pub gt: Option<Address>,
    /// Stop after this entry.
    pub gte: Option<Address>,
    /// Start at this entry's first parent.
    pub lt: Option<Address>,
    /// Start at this entry.
    pub lte: Option<Address>,
    /// Maximum number of entries to yield.
    pub amount: Option<usize>,
}

/// Plain-data view of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Stream id.
    pub id: String,
    /// Head addresses, most recent first.
    pub heads: Vec<Address>,
    /// Entries, oldest first.
    pub values: Vec<Entry>,
}

/// Options for loading a log out of a blockstore.
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Keep at most this many of the newest entries.
    pub length: Option<usize>,
    /// Addresses the caller already has; they are not fetched.
    pub exclude: HashSet<Address>,
    /// Called for every fetched entry.
    pub progress: Option<ProgressFn>,
    /// Access controller for the loaded log.
    pub access: Option<Arc<dyn AccessController>>,
    /// Sort strategy for the loaded log.
    pub sort_fn: Option<SortFn>,
    /// Config for the loaded log.
    pub config: LogConfig,
}

/// An append-only, signed, hash-linked event log that merges as a G-Set.
///
/// A `Log` is a single logical actor: mutations take `&mut self`, so
/// callers sharing one across tasks serialize them behind their own lock.
#[derive(Clone)]
pub struct Log {
    id: String,
    store: Arc<dyn BlockStore>,
    identity: Identity,
    provider: Arc<dyn IdentityProvider>,
    access: Arc<dyn AccessController>,
    sort_fn: SortFn,
    config: LogConfig,
    entries: BTreeMap<Address, Entry>,
    heads: BTreeSet<Address>,
    nexts: HashSet<Address>,
    clock: LamportClock,
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("identity", &self.identity.id)
            .field("clock", &self.clock)
            .field("len", &self.entries.len())
            .field("heads", &self.heads)
            .finish_non_exhaustive()
    }
}

impl Log {
    /// Start building a log that writes to `store` as `identity`.
    pub fn builder(
        store: Arc<dyn BlockStore>,
        identity: Identity,
        provider: Arc<dyn IdentityProvider>,
    ) -> LogBuilder {
        LogBuilder {
            store,
            identity,
            provider,
            id: None,
            access: None,
            entries: Vec::new(),
            heads: None,
            clock: None,
            sort_fn: None,
            config: LogConfig::default(),
        }
    }

    /// Stream id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity this log signs new entries with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current Lamport clock.
    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Config in use.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Blockstore this log writes to.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by address.
    pub fn get(&self, hash: &Address) -> Option<&Entry> {
        self.entries.get(hash)
    }

    /// Whether the log holds the entry at `hash`.
    pub fn has(&self, hash: &Address) -> bool {
        self.entries.contains_key(hash)
    }

    /// All entries, in address order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Head entries, most recent first.
    pub fn heads(&self) -> Vec<&Entry> {
        let mut heads: Vec<&Entry> = self
            .heads
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .collect();
        heads.sort_by(|a, b| (self.sort_fn)(a, b));
        heads.reverse();
        heads
    }

    /// All reachable entries, oldest first.
    pub fn values(&self) -> Vec<&Entry> {
        let heads = self.heads();
        let mut values = self.traverse(&heads, None, None);
        values.reverse();
        values
    }

    /// Entries that point at missing ancestors, plus entries with no parents.
    ///
    /// These are the oldest entries this replica holds on each branch.
    pub fn tails(&self) -> Vec<&Entry> {
        Self::find_tails(self.entries.values())
    }

    /// Addresses referenced through `next` that this replica doesn't hold.
    pub fn tail_hashes(&self) -> Vec<Address> {
        Self::find_tail_hashes(self.entries.values())
    }

    /// Walk from `roots` towards older entries along `next`.
    ///
    /// The most recent pending entry (by the log's sort strategy) is always
    /// visited first and each address at most once. Stops after `amount`
    /// entries, or right after emitting `end_hash`. Returns entries in visit
    /// order, newest first.
    pub fn traverse<'a>(
        &'a self,
        roots: &[&'a Entry],
        amount: Option<usize>,
        end_hash: Option<&Address>,
    ) -> Vec<&'a Entry> {
        let sort_fn = self.sort_fn;
        let mut stack: Vec<&'a Entry> = Vec::new();
        let mut traversed: HashSet<Address> = HashSet::new();
        let mut result: Vec<&'a Entry> = Vec::new();

        // Kept sorted ascending so the most recent entry is at the end.
        let push = |stack: &mut Vec<&'a Entry>, entry: &'a Entry| {
            let at = stack.partition_point(|e| sort_fn(e, entry) != Ordering::Greater);
            stack.insert(at, entry);
        };

        for root in roots {
            if traversed.insert(root.hash) {
                push(&mut stack, root);
            }
        }

        while amount.is_none_or(|n| result.len() < n) {
            let Some(entry) = stack.pop() else {
                break;
            };
            result.push(entry);

            if end_hash == Some(&entry.hash) {
                break;
            }

            for hash in &entry.next {
                if let Some(parent) = self.entries.get(hash)
                    && traversed.insert(*hash)
                {
                    push(&mut stack, parent);
                }
            }
        }

        result
    }

    /// Append `payload` using the configured reference budget.
    pub async fn append(&mut self, payload: impl Into<Vec<u8>>) -> Result<Entry, LogError> {
        let budget = self.config.append.reference_count;
        self.append_with_refs(payload, budget).await
    }

    /// Append `payload`, linking up to `reference_count` recent ancestors.
    ///
    /// `next` is the current head-set. `refs` holds the entries at distance
    /// 1, 3, 7, ... (2^j - 1) from the newest head within the first
    /// `reference_count` traversed entries, plus the farthest of them.
    /// The new entry becomes the only head.
    ///
    /// Fails with [`LogError::ClockOverflow`] when the log or one of its
    /// heads already sits at the last representable clock time.
    pub async fn append_with_refs(
        &mut self,
        payload: impl Into<Vec<u8>>,
        reference_count: usize,
    ) -> Result<Entry, LogError> {
        let heads = self.heads();
        let max_head_time = heads.iter().map(|e| e.clock.time).max().unwrap_or(0);
        let base = self.clock.with_time(self.clock.time.max(max_head_time));
        let clock = base.tick().ok_or(LogError::ClockOverflow(base.time))?;

        let traversed = self.traverse(&heads, Some(reference_count.max(heads.len())), None);
        let next: Vec<Address> = heads.iter().map(|e| e.hash).collect();
        let refs: Vec<Address> = select_references(&traversed, reference_count)
            .into_iter()
            .filter(|hash| !next.contains(hash))
            .collect();

        let entry = EntryBuilder::new(self.id.clone())
            .payload(payload)
            .next(next)
            .refs(refs)
            .clock(clock.clone())
            .identity(self.identity.clone())
            .build(self.store.as_ref(), self.provider.as_ref())
            .await?;

        if !self
            .access
            .can_append(&entry, self.provider.as_ref())
            .await?
        {
            warn!(hash = %entry.hash, identity = %self.identity.id, "append rejected");
            return Err(LogError::AppendNotPermitted {
                identity: self.identity.id.clone(),
            });
        }

        self.clock = clock;
        self.nexts.extend(entry.next.iter().copied());
        self.heads = BTreeSet::from([entry.hash]);
        self.entries.insert(entry.hash, entry.clone());

        debug!(
            id = %self.id,
            hash = %entry.hash,
            time = entry.clock.time,
            len = self.entries.len(),
            "appended entry"
        );

        Ok(entry)
    }

    /// Merge `other` into this log.
    ///
    /// Logs of different streams are left alone and reported as
    /// [`JoinOutcome::SkippedDifferentStream`]. Otherwise every entry new to
    /// this log is permission-checked, then signature- and hash-checked, in
    /// discovery order; the first failure aborts the join with nothing
    /// merged. With `max_size` set, only the newest `max_size` entries are
    /// kept afterwards.
    #[tracing::instrument(skip(self, other), fields(id = %self.id, other = %other.id))]
    pub async fn join(
        &mut self,
        other: &Log,
        max_size: Option<usize>,
    ) -> Result<JoinOutcome, LogError> {
        if other.id != self.id {
            debug!("skipping join across different streams");
            return Ok(JoinOutcome::SkippedDifferentStream);
        }

        let new_items = Self::difference(other, self);

        for entry in &new_items {
            if !self
                .access
                .can_append(entry, self.provider.as_ref())
                .await?
            {
                let identity = entry
                    .identity
                    .as_ref()
                    .map(|i| i.id.clone())
                    .unwrap_or_default();
                warn!(hash = %entry.hash, %identity, "join rejected entry");
                return Err(LogError::AppendNotPermitted { identity });
            }
        }

        for entry in &new_items {
            if !Entry::verify(self.provider.as_ref(), entry).await? {
                let public_key = entry
                    .identity
                    .as_ref()
                    .map(Identity::public_key_hex)
                    .unwrap_or_default();
                warn!(hash = %entry.hash, %public_key, "join found invalid signature");
                return Err(LogError::SignatureInvalid {
                    hash: entry.hash,
                    public_key,
                });
            }
            if !entry.verify_hash() {
                warn!(hash = %entry.hash, "join found entry not matching its address");
                return Err(LogError::InvalidHash(entry.hash));
            }
        }

        let added = new_items.len();
        for entry in new_items {
            self.nexts.extend(entry.next.iter().copied());
            self.entries.insert(entry.hash, entry.clone());
        }

        let candidates: Vec<&Entry> = self
            .heads
            .iter()
            .chain(other.heads.iter())
            .filter_map(|hash| self.entries.get(hash))
            .collect();
        let heads: BTreeSet<Address> = Self::find_heads(candidates)
            .into_iter()
            .map(|e| e.hash)
            .filter(|hash| !self.nexts.contains(hash))
            .collect();
        self.heads = heads;

        if let Some(size) = max_size {
            self.truncate(size);
        }

        let max_head_time = self
            .heads
            .iter()
            .filter_map(|hash| self.entries.get(hash))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        self.clock = self.clock.with_time(self.clock.time.max(max_head_time));

        debug!(added, len = self.entries.len(), heads = self.heads.len(), "joined");
        Ok(JoinOutcome::Merged { added })
    }

    /// Like [`join`](Self::join), but a different stream id is an error.
    pub async fn join_strict(
        &mut self,
        other: &Log,
        max_size: Option<usize>,
    ) -> Result<usize, LogError> {
        match self.join(other, max_size).await? {
            JoinOutcome::Merged { added } => Ok(added),
            JoinOutcome::SkippedDifferentStream => Err(LogError::DifferentLogId {
                expected: self.id.clone(),
                actual: other.id.clone(),
            }),
        }
    }

    /// Keep only the newest `size` entries and rebuild the indexes.
    fn truncate(&mut self, size: usize) {
        let values = self.values();
        let keep: Vec<Entry> = values[values.len().saturating_sub(size)..]
            .iter()
            .map(|&e| e.clone())
            .collect();

        self.heads = Self::find_heads(&keep).into_iter().map(|e| e.hash).collect();
        self.nexts = keep
            .iter()
            .flat_map(|e| e.next.iter().copied())
            .collect();
        self.entries = keep.into_iter().map(|e| (e.hash, e)).collect();
    }

    /// Entries in the range described by `options`, newest first.
    ///
    /// Fails with [`LogError::EntryNotFound`] if a bound names an entry this
    /// log doesn't hold.
    pub fn iter(&self, options: &IterOptions) -> Result<Vec<&Entry>, LogError> {
        if options.amount == Some(0) {
            return Ok(Vec::new());
        }

        let lookup = |hash: &Address| self.get(hash).ok_or(LogError::EntryNotFound(*hash));

        let start: Vec<&Entry> = if let Some(lte) = &options.lte {
            vec![lookup(lte)?]
        } else if let Some(lt) = &options.lt {
            lookup(lt)?
                .next
                .first()
                .and_then(|parent| self.get(parent))
                .into_iter()
                .collect()
        } else {
            self.heads()
        };

        let end_hash = match (&options.gte, &options.gt) {
            (Some(gte), _) => Some(lookup(gte)?.hash),
            (None, Some(gt)) => Some(lookup(gt)?.hash),
            (None, None) => None,
        };
        let amount = if end_hash.is_some() {
            None
        } else {
            options.amount
        };

        let mut entries = self.traverse(&start, amount, end_hash.as_ref());

        if let Some(gt) = &options.gt
            && options.gte.is_none()
            && entries.last().is_some_and(|e| e.hash == *gt)
        {
            entries.pop();
        }

        if end_hash.is_some()
            && let Some(n) = options.amount
        {
            let skip = entries.len().saturating_sub(n);
            entries.drain(..skip);
        }

        Ok(entries)
    }

    /// Plain-data copy of the log.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id.clone(),
            heads: self.heads().iter().map(|e| e.hash).collect(),
            values: self.values().into_iter().cloned().collect(),
        }
    }

    /// Render the log as text, newest entry first, one line per entry.
    ///
    /// Each line is indented by how many descendants the entry has,
    /// ending in `└─` when it has any.
    pub fn render(&self, payload_mapper: impl Fn(&[u8]) -> String) -> String {
        let values = self.values();

        values
            .iter()
            .rev()
            .map(|entry| {
                let children = Entry::find_children(entry, &values).len();
                let mut line = "  ".repeat(children.saturating_sub(1));
                if children > 0 {
                    line.push_str("└─");
                }
                line.push_str(&payload_mapper(&entry.payload));
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the head-set to the blockstore and return its address.
    pub async fn to_address(&self) -> Result<Address, LogError> {
        LogCodec::new(Arc::clone(&self.store), self.config.fetch.clone())
            .to_address(self)
            .await
    }

    /// Load the log whose head-set is stored at `address`.
    pub async fn from_address(
        store: Arc<dyn BlockStore>,
        identity: Identity,
        provider: Arc<dyn IdentityProvider>,
        address: &Address,
        options: LoadOptions,
    ) -> Result<Log, LogError> {
        let codec = LogCodec::new(Arc::clone(&store), options.config.fetch.clone());
        let loaded = codec
            .from_address(address, options.length, &options.exclude, options.progress.clone())
            .await?;

        Ok(Log::builder(store, identity, provider)
            .id(loaded.id)
            .entries(loaded.values)
            .heads(loaded.heads)
            .clock(loaded.clock)
            .load_options(options)
            .build())
    }

    /// Load a log of stream `id` from the history behind entry `hash`.
    pub async fn from_entry_hash(
        store: Arc<dyn BlockStore>,
        identity: Identity,
        provider: Arc<dyn IdentityProvider>,
        hash: &Address,
        id: impl Into<String>,
        options: LoadOptions,
    ) -> Result<Log, LogError> {
        let codec = LogCodec::new(Arc::clone(&store), options.config.fetch.clone());
        let values = codec
            .from_entry_hash(hash, options.length, &options.exclude, options.progress.clone())
            .await;

        Ok(Log::builder(store, identity, provider)
            .id(id)
            .entries(values)
            .load_options(options)
            .build())
    }

    /// Load a log from entries in hand plus the history behind them.
    ///
    /// The stream id is taken from the newest loaded entry.
    pub async fn from_entry(
        store: Arc<dyn BlockStore>,
        identity: Identity,
        provider: Arc<dyn IdentityProvider>,
        sources: &[Entry],
        options: LoadOptions,
    ) -> Result<Log, LogError> {
        let codec = LogCodec::new(Arc::clone(&store), options.config.fetch.clone());
        let loaded = codec
            .from_entry(sources, options.length, &options.exclude, options.progress.clone())
            .await;

        let mut builder = Log::builder(store, identity, provider)
            .entries(loaded.values)
            .load_options(options);
        if let Some(id) = loaded.id {
            builder = builder.id(id);
        }

        Ok(builder.build())
    }

    /// Entries in `a` that `b` doesn't hold, restricted to `b`'s stream.
    ///
    /// Breadth-first from `a`'s heads along `next` and `refs`, not
    /// descending past anything `b` already has.
    pub fn difference<'a>(a: &'a Log, b: &Log) -> Vec<&'a Entry> {
        let mut queue: VecDeque<Address> = a.heads().iter().map(|e| e.hash).collect();
        let mut traversed: HashSet<Address> = HashSet::new();
        let mut result: Vec<&'a Entry> = Vec::new();

        while let Some(hash) = queue.pop_front() {
            if !traversed.insert(hash) {
                continue;
            }
            let Some(entry) = a.entries.get(&hash) else {
                continue;
            };
            if b.has(&hash) || entry.log_id != b.id {
                continue;
            }

            result.push(entry);
            for link in entry.next.iter().chain(entry.refs.iter()) {
                if !traversed.contains(link) && !b.has(link) {
                    queue.push_back(*link);
                }
            }
        }

        result
    }

    /// Entries of `entries` that no other entry in it points at via `next`.
    ///
    /// Sorted by [`Entry::compare`], then address.
    pub fn find_heads<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<&'a Entry> {
        let entries: Vec<&'a Entry> = entries.into_iter().collect();
        let referenced: HashSet<&Address> = entries.iter().flat_map(|&e| e.next.iter()).collect();

        let mut seen = HashSet::new();
        let mut heads: Vec<&'a Entry> = entries
            .into_iter()
            .filter(|e| !referenced.contains(&e.hash) && seen.insert(e.hash))
            .collect();
        heads.sort_by(|a, b| Entry::compare(a, b).then_with(|| a.hash.cmp(&b.hash)));
        heads
    }

    /// Entries of `entries` with no parents or with a parent outside it.
    ///
    /// Sorted by [`Entry::compare`], then address.
    pub fn find_tails<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<&'a Entry> {
        let entries: Vec<&'a Entry> = entries.into_iter().collect();
        let known: HashSet<&Address> = entries.iter().map(|&e| &e.hash).collect();

        let mut seen = HashSet::new();
        let mut tails: Vec<&'a Entry> = entries
            .into_iter()
            .filter(|e| e.next.is_empty() || e.next.iter().any(|n| !known.contains(n)))
            .filter(|e| seen.insert(e.hash))
            .collect();
        tails.sort_by(|a, b| Entry::compare(a, b).then_with(|| a.hash.cmp(&b.hash)));
        tails
    }

    /// Addresses referenced via `next` within `entries` but absent from it.
    ///
    /// Listed in the order of the entries referencing them, oldest first.
    pub fn find_tail_hashes<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<Address> {
        let mut entries: Vec<&'a Entry> = entries.into_iter().collect();
        entries.sort_by(|a, b| Entry::compare(a, b).then_with(|| a.hash.cmp(&b.hash)));
        let known: HashSet<Address> = entries.iter().map(|e| e.hash).collect();

        let mut seen = HashSet::new();
        entries
            .iter()
            .flat_map(|e| e.next.iter().copied())
            .filter(|hash| !known.contains(hash) && seen.insert(*hash))
            .collect()
    }
}

/// Pick reference targets out of a newest-first traversal.
///
/// Within the first `min(budget, traversed.len())` entries, takes those at
/// index 2^j - 1 and always the last one.
fn select_references(traversed: &[&Entry], budget: usize) -> Vec<Address> {
    let window = budget.min(traversed.len());
    if window == 0 {
        return Vec::new();
    }

    let mut picked: Vec<Address> = Vec::new();
    let mut index = 0usize;
    while index < window {
        picked.push(traversed[index].hash);
        index = index * 2 + 1;
    }

    let last = traversed[window - 1].hash;
    if !picked.contains(&last) {
        picked.push(last);
    }

    picked
}

/// Configures a [`Log`]. Created by [`Log::builder`].
pub struct LogBuilder {
    store: Arc<dyn BlockStore>,
    identity: Identity,
    provider: Arc<dyn IdentityProvider>,
    id: Option<String>,
    access: Option<Arc<dyn AccessController>>,
    entries: Vec<Entry>,
    heads: Option<Vec<Entry>>,
    clock: Option<LamportClock>,
    sort_fn: Option<SortFn>,
    config: LogConfig,
}

impl LogBuilder {
    /// Stream id. A random one is generated when unset.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Access controller. Defaults to [`AllowAll`].
    pub fn access(mut self, access: Arc<dyn AccessController>) -> Self {
        self.access = Some(access);
        self
    }

    /// Initial entries.
    pub fn entries(mut self, entries: impl IntoIterator<Item = Entry>) -> Self {
        self.entries = entries.into_iter().collect();
        self
    }

    /// Initial heads. Computed from the entries when unset.
    pub fn heads(mut self, heads: impl IntoIterator<Item = Entry>) -> Self {
        self.heads = Some(heads.into_iter().collect());
        self
    }

    /// Starting clock time. The clock id is always the identity's key.
    pub fn clock(mut self, clock: LamportClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sort strategy. Defaults to [`last_write_wins`].
    pub fn sort_fn(mut self, sort_fn: SortFn) -> Self {
        self.sort_fn = Some(sort_fn);
        self
    }

    /// Config.
    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    fn load_options(mut self, options: LoadOptions) -> Self {
        if let Some(access) = options.access {
            self.access = Some(access);
        }
        if let Some(sort_fn) = options.sort_fn {
            self.sort_fn = Some(sort_fn);
        }
        self.config = options.config;
        self
    }

    /// Build the log.
    pub fn build(self) -> Log {
        let id = self.id.unwrap_or_else(random_log_id);

        let mut entries: BTreeMap<Address, Entry> =
            self.entries.into_iter().map(|e| (e.hash, e)).collect();

        let heads: BTreeSet<Address> = match self.heads {
            Some(heads) if !heads.is_empty() => {
                let hashes = heads.iter().map(|e| e.hash).collect();
                for head in heads {
                    entries.entry(head.hash).or_insert(head);
                }
                hashes
            }
            _ => Log::find_heads(entries.values()).into_iter().map(|e| e.hash).collect(),
        };

        let nexts: HashSet<Address> = entries
            .values()
            .flat_map(|e| e.next.iter().copied())
            .collect();

        let max_head_time = heads
            .iter()
            .filter_map(|hash| entries.get(hash))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        let start = self.clock.map(|c| c.time).unwrap_or(0).max(max_head_time);
        let clock = LamportClock::new(self.identity.public_key_hex(), start);

        Log {
            id,
            store: self.store,
            identity: self.identity,
            provider: self.provider,
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            sort_fn: self.sort_fn.unwrap_or(last_write_wins),
            config: self.config,
            entries,
            heads,
            nexts,
            clock,
        }
    }
}

fn random_log_id() -> String {
    format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
}
