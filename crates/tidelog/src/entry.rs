//! Log entry type: an immutable, signed, content-addressed DAG node.

use std::cmp::Ordering;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tidelog_store::BlockStore;
use tidelog_types::{Address, LamportClock};
use tracing::debug;

use crate::error::LogError;
use crate::identity::{Identity, IdentityProvider};

/// Schema version written by [`EntryBuilder`].
pub const ENTRY_VERSION: u8 = 2;

/// A single entry in the log DAG.
///
/// `next` holds the direct causal parents (the heads the entry was appended
/// on top of); `refs` holds extra ancestors at exponentially growing
/// distance so partial replicas can reach deep history in fewer hops.
/// Both are addresses into a store, never live references.
///
/// Entries are immutable once built. Whatever schema version an entry was
/// decoded from, it is normalised to this one shape: absent `refs` become an
/// empty vector, a legacy bare key becomes an [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Content address: `blake3` of the encoded entry (which excludes this field).
    pub hash: Address,
    /// Log stream the entry belongs to.
    pub log_id: String,
    /// Application data.
    pub payload: Vec<u8>,
    /// Addresses of direct causal parents.
    pub next: Vec<Address>,
    /// Addresses of additional, more distant ancestors.
    pub refs: Vec<Address>,
    /// Lamport clock at creation time.
    pub clock: LamportClock,
    /// Signer's public descriptor.
    pub identity: Option<Identity>,
    /// Signature over the signable form (see [`Entry::signable_bytes`]).
    pub sig: Option<Vec<u8>>,
    /// Schema version the entry was written with.
    pub version: u8,
}

// ---------------------------------------------------------------------------
// Stored form
// ---------------------------------------------------------------------------

/// Versioned on-store encoding of an entry.
#[derive(Serialize, Deserialize)]
enum EntryRecord {
    V1(RecordV1),
    V2(RecordV2),
}

/// Legacy records: no `refs`, the signer known only by its key.
#[derive(Serialize, Deserialize)]
struct RecordV1 {
    log_id: String,
    payload: Vec<u8>,
    next: Vec<Address>,
    clock: LamportClock,
    key: Option<Vec<u8>>,
    sig: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct RecordV2 {
    log_id: String,
    payload: Vec<u8>,
    next: Vec<Address>,
    refs: Vec<Address>,
    clock: LamportClock,
    identity: Option<Identity>,
    sig: Option<Vec<u8>>,
}

/// Signable content of a v2 [`Entry`] (excludes `hash` and `sig`).
#[derive(Serialize)]
struct SignableV2<'a> {
    log_id: &'a str,
    payload: &'a [u8],
    next: &'a [Address],
    refs: &'a [Address],
    clock: &'a LamportClock,
    identity: &'a Identity,
    version: u8,
}

/// Signable content of a v1 [`Entry`].
#[derive(Serialize)]
struct SignableV1<'a> {
    log_id: &'a str,
    payload: &'a [u8],
    next: &'a [Address],
    clock: &'a LamportClock,
    version: u8,
}

impl Entry {
    /// Decode an entry read from the store under `hash`.
    pub fn decode(hash: Address, bytes: &[u8]) -> Result<Self, LogError> {
        let record: EntryRecord = postcard::from_bytes(bytes)?;

        let entry = match record {
            EntryRecord::V1(r) => Self {
                hash,
                log_id: r.log_id,
                payload: r.payload,
                next: r.next,
                refs: Vec::new(),
                clock: r.clock,
                identity: r.key.map(Identity::from_public_key),
                sig: r.sig,
                version: 1,
            },
            EntryRecord::V2(r) => Self {
                hash,
                log_id: r.log_id,
                payload: r.payload,
                next: r.next,
                refs: r.refs,
                clock: r.clock,
                identity: r.identity,
                sig: r.sig,
                version: 2,
            },
        };

        Ok(entry)
    }

    /// Encode the entry in the record layout of its own schema version.
    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        let record = if self.version < 2 {
            EntryRecord::V1(RecordV1 {
                log_id: self.log_id.clone(),
                payload: self.payload.clone(),
                next: self.next.clone(),
                clock: self.clock.clone(),
                key: self.identity.as_ref().map(|i| i.public_key.clone()),
                sig: self.sig.clone(),
            })
        } else {
            EntryRecord::V2(RecordV2 {
                log_id: self.log_id.clone(),
                payload: self.payload.clone(),
                next: self.next.clone(),
                refs: self.refs.clone(),
                clock: self.clock.clone(),
                identity: self.identity.clone(),
                sig: self.sig.clone(),
            })
        };

        Ok(postcard::to_allocvec(&record)?)
    }

    /// Canonical bytes the signature covers.
    ///
    /// Fails with [`LogError::MissingIdentity`] for a v2 entry without an
    /// identity, since the identity is part of what is signed.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, LogError> {
        let bytes = if self.version < 2 {
            postcard::to_allocvec(&SignableV1 {
                log_id: &self.log_id,
                payload: &self.payload,
                next: &self.next,
                clock: &self.clock,
                version: self.version,
            })?
        } else {
            let identity = self
                .identity
                .as_ref()
                .ok_or(LogError::MissingIdentity(self.hash))?;
            postcard::to_allocvec(&SignableV2 {
                log_id: &self.log_id,
                payload: &self.payload,
                next: &self.next,
                refs: &self.refs,
                clock: &self.clock,
                identity,
                version: self.version,
            })?
        };

        Ok(bytes)
    }

    /// Check that the stored hash matches the entry's content.
    pub fn verify_hash(&self) -> bool {
        match self.encode() {
            Ok(bytes) => Address::from_data(&bytes) == self.hash,
            Err(_) => false,
        }
    }

    /// Verify the entry's signature with `provider`.
    ///
    /// A missing signature or identity is a structural error and is returned
    /// as `Err`; a signature that simply doesn't match is `Ok(false)`.
    pub async fn verify(provider: &dyn IdentityProvider, entry: &Entry) -> Result<bool, LogError> {
        let sig = entry
            .sig
            .as_ref()
            .ok_or(LogError::MissingSignature(entry.hash))?;
        let identity = entry
            .identity
            .as_ref()
            .ok_or(LogError::MissingIdentity(entry.hash))?;

        if identity.public_key.is_empty() {
            return Err(LogError::MissingIdentity(entry.hash));
        }

        let data = entry.signable_bytes()?;
        provider.verify(sig, &identity.public_key, &data).await
    }

    /// Order by clock time, then by clock id (smaller id first).
    pub fn compare(a: &Entry, b: &Entry) -> Ordering {
        LamportClock::compare(&a.clock, &b.clock).then_with(|| a.clock.id.cmp(&b.clock.id))
    }

    /// Whether `parent` is a direct causal parent of `child`.
    pub fn is_parent(parent: &Entry, child: &Entry) -> bool {
        child.next.contains(&parent.hash)
    }

    /// Follow children of `entry` through `pool`, one link at a time.
    ///
    /// Returns the chain sorted by ascending clock time.
    pub fn find_children<'a>(entry: &Entry, pool: &[&'a Entry]) -> Vec<&'a Entry> {
        let mut chain: Vec<&'a Entry> = Vec::new();
        let mut prev = entry;

        while let Some(&child) = pool.iter().find(|e| Entry::is_parent(prev, e)) {
            if chain.iter().any(|c| c.hash == child.hash) {
                break;
            }
            chain.push(child);
            prev = child;
        }

        chain.sort_by(|a, b| a.clock.time.cmp(&b.clock.time));
        chain
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds, signs, and stores a new [`Entry`].
///
/// ```ignore
/// let entry = EntryBuilder::new("log-a")
///     .identity(identity.clone())
///     .payload(b"hello".to_vec())
///     .next(heads)
///     .clock(clock)
///     .build(store.as_ref(), provider.as_ref())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    log_id: String,
    payload: Option<Vec<u8>>,
    next: Vec<Address>,
    refs: Vec<Address>,
    clock: Option<LamportClock>,
    identity: Option<Identity>,
}

impl EntryBuilder {
    /// Start an entry for log stream `log_id`.
    pub fn new(log_id: impl Into<String>) -> Self {
        Self {
            log_id: log_id.into(),
            payload: None,
            next: Vec::new(),
            refs: Vec::new(),
            clock: None,
            identity: None,
        }
    }

    /// Set the payload.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the direct parents.
    pub fn next(mut self, next: impl IntoIterator<Item = Address>) -> Self {
        self.next = next.into_iter().collect();
        self
    }

    /// Set the reference links.
    pub fn refs(mut self, refs: impl IntoIterator<Item = Address>) -> Self {
        self.refs = refs.into_iter().collect();
        self
    }

    /// Set the clock. Defaults to time 0 owned by the identity's key.
    pub fn clock(mut self, clock: LamportClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the signing identity.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sign the entry, write it to `store`, and return it with its address.
    pub async fn build(
        self,
        store: &dyn BlockStore,
        provider: &dyn IdentityProvider,
    ) -> Result<Entry, LogError> {
        let identity = self.identity.ok_or(LogError::IdentityRequired)?;
        let payload = self.payload.ok_or(LogError::EntryDataRequired)?;
        let clock = self
            .clock
            .unwrap_or_else(|| LamportClock::new(identity.public_key_hex(), 0));

        let mut entry = Entry {
            hash: Address::from([0u8; 32]),
            log_id: self.log_id,
            payload,
            next: self.next,
            refs: self.refs,
            clock,
            identity: Some(identity),
            sig: None,
            version: ENTRY_VERSION,
        };

        let signable = entry.signable_bytes()?;
        let identity = entry.identity.as_ref().ok_or(LogError::IdentityRequired)?;
        entry.sig = Some(provider.sign(identity, &signable).await?);

        let bytes = entry.encode()?;
        entry.hash = store.put(Bytes::from(bytes)).await?;

        debug!(
            hash = %entry.hash,
            log_id = %entry.log_id,
            time = entry.clock.time,
            next = entry.next.len(),
            refs = entry.refs.len(),
            "created entry"
        );

        Ok(entry)
    }
}
