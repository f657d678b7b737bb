//! # Chain Engine
//!
//! Owns the append / read / validate protocol over a [`Store`] and a
//! [`Hasher`]. The engine keeps no chain state of its own: every call reads
//! the store, so several handles over one store always agree on what the
//! chain is.
//!
//! ## Append
//!
//! ```text
//! count() ─► next height ─► fetch tail ─► link ─► hash ─► append(height)
//!                              │                            │
//!                       missing: ChainCorruption     taken: ConcurrentAppendConflict
//! ```
//!
//! Reading the height and writing at height + 1 is two steps, so it is
//! guarded twice. Appends through one handle are serialized by a writer
//! lock. Appends through different handles meet at the store's conditional
//! append, where the loser gets [`ChainError::ConcurrentAppendConflict`]
//! instead of overwriting the winner.
//!
//! ## Validation
//!
//! A block is valid when its stored hash matches the recomputed one and,
//! above genesis, its `previousBlockHash` matches the stored hash of the
//! block below it. Tampering is an ordinary `false`; only infrastructure
//! failures are errors. Heights are checked independently, so a full-chain
//! pass can fan out over the rayon pool.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::block::Block;
use super::db::{Store, StoreError};
use crate::config::GENESIS_PREVIOUS_HASH;
use crate::crypto::{Hasher, Sha256Hasher};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors surfaced by chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no block at height {height}")]
    NotFound { height: u64 },

    #[error("chain corrupted: expected a block at height {height} but none is stored")]
    ChainCorruption { height: u64 },

    #[error("height {height} was appended by another writer first")]
    ConcurrentAppendConflict { height: u64 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("store is incompatible with this engine: {0}")]
    IncompatibleStore(#[source] StoreError),

    #[error("block at height {height} is not a well-formed record: {source}")]
    Serialization {
        height: u64,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for ChainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Occupied { height } => ChainError::ConcurrentAppendConflict { height },
            StoreError::AlgorithmMismatch { .. }
            | StoreError::Metadata(_)
            | StoreError::InvalidKey { .. } => ChainError::IncompatibleStore(e),
            StoreError::Sled(_) => ChainError::StoreUnavailable(e),
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

// ---------------------------------------------------------------------------
// Validation Results
// ---------------------------------------------------------------------------

/// Outcome of checking a single stored block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockVerdict {
    /// Hash and link both check out.
    Valid,
    /// The stored hash does not match the block's content.
    ContentTampered,
    /// The record is internally consistent but claims a different height
    /// than the key it is stored under.
    Misplaced,
    /// `previousBlockHash` does not match the block below.
    LinkBroken,
}

impl BlockVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, BlockVerdict::Valid)
    }

    /// The failure this verdict represents, if any.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            BlockVerdict::Valid => None,
            BlockVerdict::ContentTampered => Some(FailureKind::ContentTampered),
            BlockVerdict::Misplaced => Some(FailureKind::Misplaced),
            BlockVerdict::LinkBroken => Some(FailureKind::LinkBroken),
        }
    }
}

/// Why a height failed a full-chain validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ContentTampered,
    Misplaced,
    /// The link could not be confirmed: it points at a different hash, or
    /// the block below is missing or unreadable.
    LinkBroken,
    /// Nothing is stored at a height inside the chain's range.
    Missing,
    /// The stored bytes do not parse as a block.
    Unreadable,
}

/// Result of [`ChainEngine::validate_chain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Number of heights examined.
    pub checked: u64,
    /// Every failing height and the reason it failed.
    pub failures: BTreeMap<u64, FailureKind>,
}

impl ValidationReport {
    /// True when no height failed.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failing_heights(&self) -> BTreeSet<u64> {
        self.failures.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// ChainEngine
// ---------------------------------------------------------------------------

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// The append/read/validate engine.
///
/// Share one engine between threads with `Arc<ChainEngine<..>>`; all methods
/// take `&self`.
pub struct ChainEngine<S: Store, H: Hasher = Sha256Hasher> {
    store: S,
    hasher: H,
    /// Serializes appends made through this handle.
    writer: Mutex<()>,
    clock: fn() -> u64,
    parallel_validation: bool,
    flush_on_append: bool,
}

impl<S: Store, H: Hasher> ChainEngine<S, H> {
    /// Build an engine over `store` hashing with `hasher`.
    ///
    /// Parallel validation is on and per-append flushing is off by default.
    pub fn new(store: S, hasher: H) -> Self {
        Self {
            store,
            hasher,
            writer: Mutex::new(()),
            clock: unix_now,
            parallel_validation: true,
            flush_on_append: false,
        }
    }

    /// Replace the wall clock used for block timestamps.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_parallel_validation(mut self, enabled: bool) -> Self {
        self.parallel_validation = enabled;
        self
    }

    pub fn with_flush_on_append(mut self, enabled: bool) -> Self {
        self.flush_on_append = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    // -- Reads --------------------------------------------------------------

    /// Highest stored height, or `None` for an empty chain.
    pub fn height(&self) -> ChainResult<Option<u64>> {
        Ok(self.store.count()?.checked_sub(1))
    }

    /// Read and decode the block at `height`.
    pub fn get_block(&self, height: u64) -> ChainResult<Block> {
        let bytes = self
            .store
            .get(height)?
            .ok_or(ChainError::NotFound { height })?;
        debug!(height, len = bytes.len(), "block read");
        Block::from_bytes(&bytes).map_err(|source| ChainError::Serialization { height, source })
    }

    /// The block at the current height, if the chain is not empty.
    pub fn tip(&self) -> ChainResult<Option<Block>> {
        match self.height()? {
            Some(height) => self.get_block(height).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks in `range`, clamped to the current height.
    pub fn blocks(&self, range: RangeInclusive<u64>) -> ChainResult<Vec<Block>> {
        let Some(tip) = self.height()? else {
            return Ok(Vec::new());
        };
        let end = (*range.end()).min(tip);
        (*range.start()..=end).map(|h| self.get_block(h)).collect()
    }

    // -- Writes -------------------------------------------------------------

    /// Create the genesis block if, and only if, the chain is empty.
    ///
    /// Returns the new genesis block, or `None` when one already existed.
    /// Losing a race for height 0 against another handle also yields `None`.
    pub fn bootstrap(&self) -> ChainResult<Option<Block>> {
        let _writer = self.writer.lock();
        if let Some(height) = self.height()? {
            debug!(height, "chain already bootstrapped");
            return Ok(None);
        }
        match self.append_at(Block::genesis(), 0) {
            Ok(genesis) => {
                info!(hash = %genesis.hash, "genesis block created");
                Ok(Some(genesis))
            }
            Err(ChainError::ConcurrentAppendConflict { height: 0 }) => {
                debug!("genesis written by another handle");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Append a block carrying `payload` at the next height.
    pub fn append(&self, payload: impl Into<String>) -> ChainResult<Block> {
        let _writer = self.writer.lock();
        let height = match self.height()? {
            Some(tip) => tip + 1,
            None => 0,
        };
        self.append_at(Block::new(payload), height)
    }

    /// Place `block` at `height`. Caller holds the writer lock.
    fn append_at(&self, mut block: Block, height: u64) -> ChainResult<Block> {
        block.height = height;
        block.time_stamp = (self.clock)();
        block.previous_block_hash = if height == 0 {
            GENESIS_PREVIOUS_HASH.to_string()
        } else {
            match self.get_block(height - 1) {
                Ok(tail) => tail.hash,
                Err(ChainError::NotFound { height }) => {
                    return Err(ChainError::ChainCorruption { height })
                }
                Err(e) => return Err(e),
            }
        };

        let encode_err = |source| ChainError::Serialization { height, source };
        block.hash = block.compute_hash(&self.hasher).map_err(encode_err)?;
        let bytes = block.to_bytes().map_err(encode_err)?;

        if let Err(e) = self.store.append(height, &bytes) {
            warn!(height, error = %e, "append rejected by store");
            return Err(e.into());
        }
        if self.flush_on_append {
            self.store.flush()?;
        }

        info!(height, hash = %block.hash, "block appended");
        Ok(block)
    }

    // -- Validation ---------------------------------------------------------

    /// Check one block's content hash and its link to the block below.
    pub fn inspect_block(&self, height: u64) -> ChainResult<BlockVerdict> {
        let block = self.get_block(height)?;
        let encode_err = |source| ChainError::Serialization { height, source };

        let recomputed = block.compute_hash(&self.hasher).map_err(encode_err)?;
        if recomputed != block.hash {
            warn!(height, stored = %block.hash, %recomputed, "block hash mismatch");
            return Ok(BlockVerdict::ContentTampered);
        }
        if block.height != height {
            warn!(height, claimed = block.height, "block stored under the wrong height");
            return Ok(BlockVerdict::Misplaced);
        }
        if height == 0 {
            return Ok(BlockVerdict::Valid);
        }

        let previous = self.get_block(height - 1)?;
        if previous.hash != block.previous_block_hash {
            warn!(
                height,
                linked = %block.previous_block_hash,
                actual = %previous.hash,
                "block link mismatch"
            );
            return Ok(BlockVerdict::LinkBroken);
        }
        Ok(BlockVerdict::Valid)
    }

    /// `true` if the block at `height` is untampered and correctly linked.
    pub fn validate_block(&self, height: u64) -> ChainResult<bool> {
        self.inspect_block(height).map(|v| v.is_valid())
    }

    /// Classify one block the way a full-chain pass would.
    ///
    /// Unlike [`inspect_block`](Self::inspect_block), a predecessor that is
    /// missing or unreadable is a [`FailureKind::LinkBroken`] failure rather
    /// than an error, and unreadable bytes at `height` are
    /// [`FailureKind::Unreadable`]. Nothing stored at `height` is still
    /// [`ChainError::NotFound`].
    pub fn check_block(&self, height: u64) -> ChainResult<Option<FailureKind>> {
        match self.inspect_block(height) {
            Ok(verdict) => Ok(verdict.failure()),
            Err(ChainError::Serialization { height: bad, .. }) if bad == height => {
                Ok(Some(FailureKind::Unreadable))
            }
            Err(ChainError::NotFound { height: below })
            | Err(ChainError::Serialization { height: below, .. })
                if height.checked_sub(1) == Some(below) =>
            {
                Ok(Some(FailureKind::LinkBroken))
            }
            Err(e) => Err(e),
        }
    }

    /// Validate every height from genesis to the tip.
    ///
    /// Never stops at a failing height. Missing or unreadable records are
    /// reported as failures; only a store failure aborts the pass.
    pub fn validate_chain(&self) -> ChainResult<ValidationReport> {
        let Some(tip) = self.height()? else {
            return Ok(ValidationReport::default());
        };

        let outcomes: Vec<(u64, Option<FailureKind>)> = if self.parallel_validation {
            (0..=tip)
                .into_par_iter()
                .map(|h| self.classify(h))
                .collect::<ChainResult<_>>()?
        } else {
            (0..=tip)
                .map(|h| self.classify(h))
                .collect::<ChainResult<_>>()?
        };

        let failures: BTreeMap<u64, FailureKind> = outcomes
            .into_iter()
            .filter_map(|(h, failure)| failure.map(|kind| (h, kind)))
            .collect();

        if failures.is_empty() {
            info!(checked = tip + 1, "chain valid");
        } else {
            warn!(checked = tip + 1, failing = failures.len(), "chain validation failed");
        }
        Ok(ValidationReport {
            checked: tip + 1,
            failures,
        })
    }

    fn classify(&self, height: u64) -> ChainResult<(u64, Option<FailureKind>)> {
        let failure = match self.check_block(height) {
            Ok(failure) => failure,
            Err(ChainError::NotFound { height: missing }) if missing == height => {
                Some(FailureKind::Missing)
            }
            Err(e) => return Err(e),
        };
        Ok((height, failure))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENESIS_PAYLOAD;
    use crate::crypto::Blake3Hasher;
    use crate::storage::db::{MemoryStore, SledStore, StoreResult};
    use crate::storage::tamper::TamperStore;
    use std::sync::{Arc, Barrier};
    use std::thread;

    type TestEngine = ChainEngine<Arc<MemoryStore>, Sha256Hasher>;

    fn fixed_clock() -> u64 {
        1_700_000_000
    }

    fn engine() -> (TestEngine, TamperStore<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let engine = ChainEngine::new(Arc::clone(&store), Sha256Hasher).with_clock(fixed_clock);
        (engine, TamperStore::new(store))
    }

    /// Genesis plus `extra` payload blocks.
    fn built_chain(extra: usize) -> (TestEngine, TamperStore<Arc<MemoryStore>>) {
        let (engine, tamper) = engine();
        engine.bootstrap().unwrap();
        for i in 1..=extra {
            engine.append(format!("payload {i}")).unwrap();
        }
        (engine, tamper)
    }

    // -- Bootstrap ----------------------------------------------------------

    #[test]
    fn empty_chain_has_no_height() {
        let (engine, _) = engine();
        assert_eq!(engine.height().unwrap(), None);
        assert!(engine.tip().unwrap().is_none());
        assert!(engine.validate_chain().unwrap().is_valid());
    }

    #[test]
    fn bootstrap_creates_genesis() {
        let (engine, _) = engine();
        let genesis = engine.bootstrap().unwrap().expect("fresh chain");
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.payload, GENESIS_PAYLOAD);
        assert!(genesis.previous_block_hash.is_empty());
        assert_eq!(genesis.time_stamp, fixed_clock());
        assert_eq!(engine.height().unwrap(), Some(0));
        assert_eq!(engine.get_block(0).unwrap(), genesis);
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let (engine, _) = engine();
        assert!(engine.bootstrap().unwrap().is_some());
        for _ in 0..5 {
            assert!(engine.bootstrap().unwrap().is_none());
        }
        assert_eq!(engine.store().count().unwrap(), 1);
    }

    #[test]
    fn bootstrap_leaves_existing_chain_alone() {
        let (engine, _) = built_chain(3);
        assert!(engine.bootstrap().unwrap().is_none());
        assert_eq!(engine.height().unwrap(), Some(3));
    }

    #[test]
    fn concurrent_bootstraps_make_one_genesis() {
        let store = Arc::new(MemoryStore::new());
        let barrier = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let engine = ChainEngine::new(Arc::clone(&store), Sha256Hasher);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.bootstrap().unwrap().is_some()
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    // -- Append -------------------------------------------------------------

    #[test]
    fn append_on_empty_chain_lands_at_height_zero() {
        let (engine, _) = engine();
        let block = engine.append("first").unwrap();
        assert_eq!(block.height, 0);
        assert!(block.previous_block_hash.is_empty());
    }

    #[test]
    fn heights_are_contiguous() {
        let (engine, _) = built_chain(5);
        for h in 0..=5 {
            assert_eq!(engine.get_block(h).unwrap().height, h);
        }
        assert!(matches!(
            engine.get_block(6),
            Err(ChainError::NotFound { height: 6 })
        ));
    }

    #[test]
    fn blocks_link_to_their_predecessor() {
        let (engine, _) = built_chain(6);
        for h in 1..=6 {
            let block = engine.get_block(h).unwrap();
            let previous = engine.get_block(h - 1).unwrap();
            assert_eq!(block.previous_block_hash, previous.hash);
        }
    }

    #[test]
    fn appended_block_is_fully_populated() {
        let (engine, _) = built_chain(1);
        let block = engine.append("data").unwrap();
        assert_eq!(block.height, 2);
        assert_eq!(block.hash, block.compute_hash(&Sha256Hasher).unwrap());
        assert_eq!(block.hash.len(), 64);
        assert_eq!(engine.tip().unwrap(), Some(block));
    }

    #[test]
    fn missing_tail_is_chain_corruption() {
        let inner = MemoryStore::new();
        ChainEngine::new(&inner, Sha256Hasher).bootstrap().unwrap();
        // Count claims three records but only genesis exists, so the tail
        // at 2 is gone.
        let engine = ChainEngine::new(StaleCountStore { inner, count: 3 }, Sha256Hasher);

        let err = engine.append("orphan").unwrap_err();
        assert!(matches!(err, ChainError::ChainCorruption { height: 2 }), "{err}");
    }

    #[test]
    fn unreadable_tail_fails_append() {
        let (engine, tamper) = built_chain(1);
        tamper.overwrite_raw(1, b"not json").unwrap();
        assert!(matches!(
            engine.append("x"),
            Err(ChainError::Serialization { height: 1, .. })
        ));
    }

    /// Reports a frozen count, as a handle that read the height before
    /// another writer got in would see it.
    struct StaleCountStore {
        inner: MemoryStore,
        count: u64,
    }

    impl Store for StaleCountStore {
        fn count(&self) -> StoreResult<u64> {
            Ok(self.count)
        }
        fn get(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(height)
        }
        fn put(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
            self.inner.put(height, bytes)
        }
        fn append(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
            self.inner.append(height, bytes)
        }
    }

    #[test]
    fn lost_race_is_concurrent_append_conflict() {
        let inner = MemoryStore::new();
        {
            let writer = ChainEngine::new(&inner, Sha256Hasher);
            writer.bootstrap().unwrap();
            writer.append("winner").unwrap();
        }
        let records_before = inner.count().unwrap();
        let stale = ChainEngine::new(StaleCountStore { inner, count: 1 }, Sha256Hasher);

        let err = stale.append("loser").unwrap_err();
        assert!(matches!(err, ChainError::ConcurrentAppendConflict { height: 1 }));
        assert_eq!(stale.store().inner.count().unwrap(), records_before);
        assert_eq!(stale.get_block(1).unwrap().payload, "winner");
    }

    #[test]
    fn shared_handle_serializes_appends() {
        let (engine, _) = built_chain(0);
        let engine = Arc::new(engine);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..10)
                        .map(|i| engine.append(format!("t{t}-{i}")).unwrap().height)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut heights: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("appender thread should not panic"))
            .collect();
        heights.sort_unstable();
        assert_eq!(heights, (1..=80).collect::<Vec<_>>());
        assert!(engine.validate_chain().unwrap().is_valid());
    }

    #[test]
    fn separate_handles_never_share_a_height() {
        let store = Arc::new(MemoryStore::new());
        ChainEngine::new(Arc::clone(&store), Sha256Hasher)
            .bootstrap()
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|t| {
                let engine = ChainEngine::new(Arc::clone(&store), Sha256Hasher);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut won = Vec::new();
                    for i in 0..25 {
                        match engine.append(format!("h{t}-{i}")) {
                            Ok(block) => won.push(block.height),
                            Err(ChainError::ConcurrentAppendConflict { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    won
                })
            })
            .collect();

        let mut heights: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = heights.len();
        heights.sort_unstable();
        heights.dedup();
        assert_eq!(heights.len(), total, "two appends claimed one height");
        assert_eq!(store.count().unwrap(), total as u64 + 1);

        let checker = ChainEngine::new(Arc::clone(&store), Sha256Hasher);
        assert!(checker.validate_chain().unwrap().is_valid());
    }

    // -- Validation ---------------------------------------------------------

    #[test]
    fn fresh_chain_validates() {
        let (engine, _) = built_chain(4);
        for h in 0..=4 {
            assert!(engine.validate_block(h).unwrap());
        }
        let report = engine.validate_chain().unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 5);
    }

    #[test]
    fn validate_block_outside_chain_is_not_found() {
        let (engine, _) = built_chain(1);
        assert!(matches!(
            engine.validate_block(9),
            Err(ChainError::NotFound { height: 9 })
        ));
    }

    #[test]
    fn content_tampering_is_isolated_to_its_height() {
        let (engine, tamper) = built_chain(4);
        let mut block = engine.get_block(2).unwrap();
        block.payload = "rewritten history".into();
        tamper.overwrite_block(2, &block).unwrap();

        assert!(!engine.validate_block(2).unwrap());
        assert_eq!(engine.inspect_block(2).unwrap(), BlockVerdict::ContentTampered);
        // Block 3 still links to the unchanged stored hash of block 2.
        assert!(engine.validate_block(3).unwrap());

        let report = engine.validate_chain().unwrap();
        assert_eq!(report.failing_heights(), BTreeSet::from([2]));
        assert_eq!(report.failures[&2], FailureKind::ContentTampered);
    }

    #[test]
    fn link_tampering_is_detected_at_the_tampered_height() {
        let (engine, tamper) = built_chain(4);
        let mut block = engine.get_block(2).unwrap();
        block.previous_block_hash = "00".repeat(32);
        block.hash = block.compute_hash(&Sha256Hasher).unwrap();
        tamper.overwrite_block(2, &block).unwrap();

        assert_eq!(engine.inspect_block(2).unwrap(), BlockVerdict::LinkBroken);
        assert!(engine.validate_block(1).unwrap());
        // Block 2's hash changed when it was rehashed, so block 3's stored
        // link no longer matches either.
        assert_eq!(engine.inspect_block(3).unwrap(), BlockVerdict::LinkBroken);
        assert!(engine.validate_block(4).unwrap());

        let report = engine.validate_chain().unwrap();
        assert_eq!(report.failing_heights(), BTreeSet::from([2, 3]));
    }

    #[test]
    fn link_tampering_at_the_tip_is_isolated() {
        let (engine, tamper) = built_chain(4);
        let mut block = engine.get_block(4).unwrap();
        block.previous_block_hash = "11".repeat(32);
        block.hash = block.compute_hash(&Sha256Hasher).unwrap();
        tamper.overwrite_block(4, &block).unwrap();

        assert!(!engine.validate_block(4).unwrap());
        assert!(engine.validate_block(3).unwrap());
        let report = engine.validate_chain().unwrap();
        assert_eq!(report.failures, BTreeMap::from([(4, FailureKind::LinkBroken)]));
    }

    #[test]
    fn tampered_genesis_is_detected() {
        let (engine, tamper) = built_chain(2);
        let mut genesis = engine.get_block(0).unwrap();
        genesis.time_stamp += 1;
        tamper.overwrite_block(0, &genesis).unwrap();

        assert!(!engine.validate_block(0).unwrap());
        assert_eq!(
            engine.validate_chain().unwrap().failing_heights(),
            BTreeSet::from([0])
        );
    }

    #[test]
    fn moved_block_is_misplaced() {
        let (engine, tamper) = built_chain(3);
        let block_one = engine.get_block(1).unwrap();
        tamper.overwrite_block(3, &block_one).unwrap();
        assert_eq!(engine.inspect_block(3).unwrap(), BlockVerdict::Misplaced);
    }

    #[test]
    fn unreadable_record_is_an_error_not_a_verdict() {
        let (engine, tamper) = built_chain(3);
        tamper.overwrite_raw(1, b"{ broken").unwrap();
        assert!(matches!(
            engine.validate_block(1),
            Err(ChainError::Serialization { height: 1, .. })
        ));
    }

    #[test]
    fn store_errors_split_transient_from_incompatible() {
        assert!(matches!(
            ChainError::from(StoreError::Occupied { height: 4 }),
            ChainError::ConcurrentAppendConflict { height: 4 }
        ));
        assert!(matches!(
            ChainError::from(StoreError::AlgorithmMismatch {
                stored: crate::crypto::HashAlgorithm::Sha256,
                requested: crate::crypto::HashAlgorithm::Blake3,
            }),
            ChainError::IncompatibleStore(_)
        ));
        assert!(matches!(
            ChainError::from(StoreError::Metadata("x".into())),
            ChainError::IncompatibleStore(_)
        ));
        assert!(matches!(
            ChainError::from(StoreError::InvalidKey { len: 9 }),
            ChainError::IncompatibleStore(_)
        ));
    }

    #[test]
    fn check_block_classifies_instead_of_failing() {
        let (engine, tamper) = built_chain(3);
        tamper.overwrite_raw(1, b"{ broken").unwrap();

        assert_eq!(engine.check_block(0).unwrap(), None);
        assert_eq!(engine.check_block(1).unwrap(), Some(FailureKind::Unreadable));
        assert_eq!(engine.check_block(2).unwrap(), Some(FailureKind::LinkBroken));
        assert_eq!(engine.check_block(3).unwrap(), None);
        assert!(matches!(
            engine.check_block(9),
            Err(ChainError::NotFound { height: 9 })
        ));
    }

    #[test]
    fn validate_chain_reports_every_failure_in_one_pass() {
        let (engine, tamper) = built_chain(6);

        let mut b1 = engine.get_block(1).unwrap();
        b1.payload = "x".into();
        tamper.overwrite_block(1, &b1).unwrap();

        tamper.overwrite_raw(4, b"garbage").unwrap();

        let mut b6 = engine.get_block(6).unwrap();
        b6.payload = "y".into();
        tamper.overwrite_block(6, &b6).unwrap();

        let report = engine.validate_chain().unwrap();
        assert_eq!(report.checked, 7);
        assert_eq!(
            report.failures,
            BTreeMap::from([
                (1, FailureKind::ContentTampered),
                (4, FailureKind::Unreadable),
                (5, FailureKind::LinkBroken),
                (6, FailureKind::ContentTampered),
            ])
        );
    }

    #[test]
    fn gaps_are_reported_as_missing() {
        let store = Arc::new(MemoryStore::new());
        let engine = ChainEngine::new(Arc::clone(&store), Sha256Hasher);
        engine.bootstrap().unwrap();
        engine.append("one").unwrap();
        // A copy of block 1 lands at 3, leaving 2 empty inside the range.
        let stray = engine.get_block(1).unwrap().to_bytes().unwrap();
        store.put(3, &stray).unwrap();
        assert_eq!(engine.height().unwrap(), Some(3));

        let report = engine.validate_chain().unwrap();
        assert_eq!(report.checked, 4);
        assert_eq!(
            report.failures,
            BTreeMap::from([(2, FailureKind::Missing), (3, FailureKind::Misplaced)])
        );
    }

    #[test]
    fn sequential_and_parallel_passes_agree() {
        let (engine, tamper) = built_chain(20);
        let mut block = engine.get_block(7).unwrap();
        block.payload = "tampered".into();
        tamper.overwrite_block(7, &block).unwrap();

        let parallel = engine.validate_chain().unwrap();
        let engine = engine.with_parallel_validation(false);
        let sequential = engine.validate_chain().unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.failing_heights(), BTreeSet::from([7]));
    }

    #[test]
    fn chain_hashed_with_another_algorithm_fails_validation() {
        let store = Arc::new(MemoryStore::new());
        let writer = ChainEngine::new(Arc::clone(&store), Blake3Hasher);
        writer.bootstrap().unwrap();
        writer.append("a").unwrap();
        assert!(writer.validate_chain().unwrap().is_valid());

        let reader = ChainEngine::new(Arc::clone(&store), Sha256Hasher);
        assert_eq!(reader.validate_chain().unwrap().failures.len(), 2);
    }

    // -- Range reads --------------------------------------------------------

    #[test]
    fn blocks_range_is_clamped_to_tip() {
        let (engine, _) = built_chain(4);
        let all = engine.blocks(0..=u64::MAX).unwrap();
        assert_eq!(all.len(), 5);
        let mid = engine.blocks(1..=3).unwrap();
        assert_eq!(
            mid.iter().map(|b| b.height).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(engine.blocks(7..=9).unwrap().is_empty());
    }

    #[test]
    fn works_over_sled() {
        let engine = ChainEngine::new(SledStore::open_temporary().unwrap(), Sha256Hasher)
            .with_flush_on_append(true);
        engine.bootstrap().unwrap();
        engine.append("on disk").unwrap();
        assert_eq!(engine.height().unwrap(), Some(1));
        assert!(engine.validate_chain().unwrap().is_valid());
    }
}
