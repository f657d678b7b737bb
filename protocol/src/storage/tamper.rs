//! # Tamper Injection
//!
//! Rewrites stored records behind the chain engine's back so that
//! validation can be exercised against a corrupted chain. Nothing here
//! hashes, links or checks heights.
//!
//! [`TamperStore`] wraps a [`Store`] directly and is deliberately not
//! reachable from [`ChainEngine`](super::chain::ChainEngine): code holding
//! only an engine handle cannot bypass the append protocol. Build one from a
//! second handle to the same store (a cloned [`SledStore`](super::SledStore)
//! or a shared `Arc<MemoryStore>`).

use super::block::Block;
use super::chain::{ChainError, ChainResult};
use super::db::{Store, StoreResult};

/// Direct, unchecked write access to a block store. Test use only.
pub struct TamperStore<S: Store> {
    store: S,
}

impl<S: Store> TamperStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Store `block` at `height` exactly as given, overwriting what is there.
    ///
    /// The block's `height` and `hash` fields are written verbatim; they are
    /// not required to match `height` or the block's content.
    pub fn overwrite_block(&self, height: u64, block: &Block) -> ChainResult<()> {
        let bytes = block
            .to_bytes()
            .map_err(|source| ChainError::Serialization { height, source })?;
        self.store.put(height, &bytes)?;
        tracing::warn!(height, "block overwritten outside the append protocol");
        Ok(())
    }

    /// Store arbitrary bytes at `height`, e.g. to simulate an unreadable record.
    pub fn overwrite_raw(&self, height: u64, bytes: &[u8]) -> StoreResult<()> {
        self.store.put(height, bytes)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}
