//! A [`BlockStore`] wrapper that adds random IO latency and unreachable blocks.
//!
//! `SlowStore` wraps any `Arc<dyn BlockStore>` and sleeps for a random
//! duration before each read or write. Individual addresses can be marked as
//! failing (reads return [`StoreError::Unreachable`]) or hanging (reads never
//! complete). The RNG is seeded for reproducible behaviour across test runs.
//!
//! # Example
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(5, 20)    // 5–20 ms per read
//!     .write_latency(10, 30)  // 10–30 ms per write
//!     .seed(42);
//! slow.hang(address);
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tidelog_types::Address;

use crate::error::StoreError;
use crate::traits::BlockStore;

/// A [`BlockStore`] wrapper that injects latency and reachability faults.
///
/// Also records how many reads were issued and the peak number of reads
/// in flight at once, so callers can assert on concurrency bounds.
pub struct SlowStore {
    inner: Arc<dyn BlockStore>,
    read_latency_ms: (u64, u64),
    write_latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
    failing: RwLock<HashSet<Address>>,
    hanging: RwLock<HashSet<Address>>,
    reads: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SlowStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            read_latency_ms: (0, 0),
            write_latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            failing: RwLock::new(HashSet::new()),
            hanging: RwLock::new(HashSet::new()),
            reads: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Set the read latency range in milliseconds (uniform random).
    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.read_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the write latency range in milliseconds (uniform random).
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed for deterministic behaviour.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Make reads of `address` fail with [`StoreError::Unreachable`].
    pub fn fail(&self, address: Address) {
        self.failing.write().expect("lock poisoned").insert(address);
    }

    /// Make reads of `address` never complete.
    pub fn hang(&self, address: Address) {
        self.hanging.write().expect("lock poisoned").insert(address);
    }

    /// Total number of `get` calls observed.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Highest number of `get` calls that were in flight at the same time.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Sleep for a random duration in `[min, max]` milliseconds.
    async fn delay(&self, range: (u64, u64)) {
        let (min, max) = range;

        if max == 0 {
            return;
        }

        let ms = if min == max {
            min
        } else {
            self.rng.lock().expect("lock poisoned").random_range(min..=max)
        };

        if ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
        }
    }

    async fn read(&self, address: &Address) -> Result<Option<Bytes>, StoreError> {
        if self.hanging.read().expect("lock poisoned").contains(address) {
            std::future::pending::<()>().await;
        }

        self.delay(self.read_latency_ms).await;

        if self.failing.read().expect("lock poisoned").contains(address) {
            return Err(StoreError::Unreachable(*address));
        }

        self.inner.get(address).await
    }
}

/// Decrements the in-flight counter when a read finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl BlockStore for SlowStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        self.delay(self.write_latency_ms).await;
        self.inner.put(data).await
    }

    async fn get(&self, address: &Address) -> Result<Option<Bytes>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.read(address).await
    }

    async fn contains(&self, address: &Address) -> Result<bool, StoreError> {
        self.delay(self.read_latency_ms).await;
        self.inner.contains(address).await
    }
}
