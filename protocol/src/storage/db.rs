//! # Block Stores
//!
//! The persistence seam of the chain engine. A [`Store`] is a durable,
//! ordered mapping from height to serialized block; the engine never looks at
//! anything else.
//!
//! Two implementations ship with the crate:
//!
//! | Store          | Backing                       | Use                       |
//! |----------------|-------------------------------|---------------------------|
//! | [`SledStore`]  | sled trees on disk            | real chains               |
//! | [`MemoryStore`]| `BTreeMap` behind a `RwLock`  | tests, throwaway chains   |
//!
//! ## sled Tree Layout
//!
//! | Tree       | Key               | Value                    |
//! |------------|-------------------|--------------------------|
//! | `blocks`   | `height` (8B BE)  | canonical block JSON     |
//! | `metadata` | key (UTF-8)       | value (UTF-8)            |
//!
//! Heights are big-endian so sled's lexicographic order is numeric order.
//!
//! ## Conditional Append
//!
//! `append` only writes if the height is still free. sled does this with a
//! compare-and-swap against "absent", so two writers racing for the same
//! height cannot both win even when they hold different engine handles.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use sled::{Db, Tree};

use crate::config::{BLOCKS_TREE, METADATA_TREE, META_HASH_ALGORITHM, META_PROTOCOL_VERSION, PROTOCOL_VERSION};
use crate::crypto::HashAlgorithm;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur inside a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("height {height} is already occupied")]
    Occupied { height: u64 },

    #[error("chain was created with {stored}, refusing to open it with {requested}")]
    AlgorithmMismatch {
        stored: HashAlgorithm,
        requested: HashAlgorithm,
    },

    #[error("corrupt metadata: {0}")]
    Metadata(String),

    #[error("block key is {len} bytes, expected 8")]
    InvalidKey { len: usize },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Store Trait
// ---------------------------------------------------------------------------

/// Persistent ordered key-value collaborator of the chain engine.
///
/// Implementations must be safe to read from many threads at once. Writes go
/// through [`Store::append`] on the normal path; [`Store::put`] exists for
/// the tamper-injection path and for bulk loading.
pub trait Store: Send + Sync {
    /// One past the highest stored height, or 0 for an empty store.
    ///
    /// For a gap-free chain this is the number of records. It must not cost
    /// more than a lookup of the last key.
    fn count(&self) -> StoreResult<u64>;

    /// Raw record at `height`, if any.
    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>>;

    /// Write or overwrite the record at `height` unconditionally.
    fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()>;

    /// Write the record at `height` only if nothing is stored there yet.
    ///
    /// Fails with [`StoreError::Occupied`] when the height is taken.
    fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()>;

    /// Make previous writes durable. A no-op for volatile stores.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn count(&self) -> StoreResult<u64> {
        (**self).count()
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(height)
    }

    fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        (**self).put(height, bytes)
    }

    fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        (**self).append(height, bytes)
    }

    fn flush(&self) -> StoreResult<()> {
        (**self).flush()
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn count(&self) -> StoreResult<u64> {
        (**self).count()
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(height)
    }

    fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        (**self).put(height, bytes)
    }

    fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        (**self).append(height, bytes)
    }

    fn flush(&self) -> StoreResult<()> {
        (**self).flush()
    }
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// sled-backed block store.
///
/// Cheap to clone: clones share the same underlying database, which makes
/// it easy to hand one store to several engine handles.
#[derive(Debug, Clone)]
pub struct SledStore {
    /// The underlying sled database handle.
    db: Db,
    /// Blocks indexed by height (big-endian u64 keys).
    blocks: Tree,
    /// Chain-wide metadata (hash algorithm, format version).
    metadata: Tree,
}

impl SledStore {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in a temporary directory and disappears on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let metadata = db.open_tree(METADATA_TREE)?;
        Ok(Self { db, blocks, metadata })
    }

    /// Hash algorithm recorded for this chain, if one was recorded.
    pub fn hash_algorithm(&self) -> StoreResult<Option<HashAlgorithm>> {
        match self.metadata.get(META_HASH_ALGORITHM)? {
            Some(raw) => {
                let name = std::str::from_utf8(&raw)
                    .map_err(|e| StoreError::Metadata(e.to_string()))?;
                name.parse().map(Some).map_err(StoreError::Metadata)
            }
            None => Ok(None),
        }
    }

    /// Pin the chain to `algorithm`.
    ///
    /// The first call on a fresh store records the algorithm (and format
    /// version). Later calls succeed only with the same algorithm.
    pub fn ensure_hash_algorithm(&self, algorithm: HashAlgorithm) -> StoreResult<()> {
        let swapped = self.metadata.compare_and_swap(
            META_HASH_ALGORITHM,
            None::<&[u8]>,
            Some(algorithm.as_str().as_bytes()),
        )?;
        if swapped.is_ok() {
            self.metadata
                .insert(META_PROTOCOL_VERSION, PROTOCOL_VERSION.as_bytes())?;
            tracing::info!(%algorithm, "hash algorithm recorded for new chain");
            return Ok(());
        }
        match self.hash_algorithm()? {
            Some(stored) if stored == algorithm => Ok(()),
            Some(stored) => Err(StoreError::AlgorithmMismatch {
                stored,
                requested: algorithm,
            }),
            None => Err(StoreError::Metadata("hash algorithm vanished".into())),
        }
    }
}

fn decode_height(key: &[u8]) -> StoreResult<u64> {
    let raw: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::InvalidKey { len: key.len() })?;
    Ok(u64::from_be_bytes(raw))
}

impl Store for SledStore {
    fn count(&self) -> StoreResult<u64> {
        match self.blocks.last()? {
            Some((key, _)) => Ok(decode_height(&key)? + 1),
            None => Ok(0),
        }
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blocks.get(height.to_be_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        self.blocks.insert(height.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        self.blocks
            .compare_and_swap(height.to_be_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::Occupied { height })
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Volatile in-memory block store.
///
/// `append` checks and inserts under one write lock, so it gives the same
/// conditional-append guarantee as [`SledStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<u64, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn count(&self) -> StoreResult<u64> {
        Ok(self
            .records
            .read()
            .last_key_value()
            .map_or(0, |(height, _)| height + 1))
    }

    fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.records.read().get(&height).cloned())
    }

    fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        self.records.write().insert(height, bytes.to_vec());
        Ok(())
    }

    fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&height) {
            return Err(StoreError::Occupied { height });
        }
        records.insert(height, bytes.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
