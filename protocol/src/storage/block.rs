//! # Block Structure
//!
//! A block is one immutable record in the chain: an opaque payload plus the
//! bookkeeping that binds it to its position and to its predecessor.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  height: u64              position, genesis = 0      │
//! │  timeStamp: u64           seconds since Unix epoch   │
//! │  payload: String          caller data                │
//! │  previousBlockHash: String  hash of height - 1       │
//! │  hash: String             digest of this block       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Canonical Encoding
//!
//! Blocks are stored as compact JSON with the keys in exactly the order
//! above. The hash input is the same encoding with `hash` set to `""`.
//! Both forms come out of one encoder ([`CanonicalBlock`]) so they can never
//! drift apart; a change to key order or formatting would change every
//! digest ever computed.

use serde::{Deserialize, Serialize};

use crate::config::{BLANK_HASH, GENESIS_PAYLOAD, GENESIS_PREVIOUS_HASH};
use crate::crypto::Hasher;

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A single chain record.
///
/// Only [`Block::new`] is meant for callers; every other field is assigned by
/// the chain engine at append time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Block {
    /// Position in the chain (0-indexed, genesis = 0).
    pub height: u64,
    /// Unix timestamp (seconds) when the block was appended.
    pub time_stamp: u64,
    /// Opaque application data.
    pub payload: String,
    /// Hash of the block at `height - 1`. Empty for genesis.
    pub previous_block_hash: String,
    /// Digest of this block's canonical encoding with `hash` blanked.
    pub hash: String,
}

/// The one encoder for both the storage form and the hash input.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalBlock<'a> {
    height: u64,
    time_stamp: u64,
    payload: &'a str,
    previous_block_hash: &'a str,
    hash: &'a str,
}

impl Block {
    /// Create an unplaced block carrying `payload`.
    ///
    /// Height, timestamp, previous hash and hash are left zero/empty until
    /// the engine fills them in.
    pub fn new(payload: impl Into<String>) -> Self {
        Block {
            height: 0,
            time_stamp: 0,
            payload: payload.into(),
            previous_block_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: BLANK_HASH.to_string(),
        }
    }

    /// An unplaced genesis block: the sentinel payload, nothing else.
    pub fn genesis() -> Self {
        Block::new(GENESIS_PAYLOAD)
    }

    /// True for the block at height 0.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    fn canonical<'a>(&'a self, hash: &'a str) -> CanonicalBlock<'a> {
        CanonicalBlock {
            height: self.height,
            time_stamp: self.time_stamp,
            payload: &self.payload,
            previous_block_hash: &self.previous_block_hash,
            hash,
        }
    }

    /// Full canonical encoding, as persisted in the store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.canonical(&self.hash))
    }

    /// Canonical encoding with `hash` blanked: the hash input.
    pub fn hashing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.canonical(BLANK_HASH))
    }

    /// Parse a stored record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Recompute this block's digest. Whatever is in `self.hash` is ignored.
    pub fn compute_hash<H: Hasher + ?Sized>(&self, hasher: &H) -> Result<String, serde_json::Error> {
        Ok(hasher.digest(&self.hashing_bytes()?))
    }

    /// True if the stored hash matches the recomputed one.
    pub fn has_valid_hash<H: Hasher + ?Sized>(&self, hasher: &H) -> Result<bool, serde_json::Error> {
        Ok(self.compute_hash(hasher)? == self.hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
