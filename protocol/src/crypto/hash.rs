//! # Hashing Utilities
//!
//! The digest primitives behind block identity. The chain engine never calls
//! a hash function directly; it goes through the [`Hasher`] trait so the
//! algorithm is chosen once, at engine construction, and stays fixed for the
//! life of a chain.
//!
//! - **SHA-256**: the default. Every block hash ever written by linkchain
//!   with default settings is a SHA-256 hex string, so this is the one you
//!   cannot change without rewriting history.
//! - **BLAKE3**: opt-in for new chains that want the faster hash.
//!
//! Digests are rendered as 64 lowercase hex characters. Blocks store them as
//! strings because the canonical block encoding is text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DIGEST_HEX_LENGTH;

/// A deterministic, side-effect free `bytes -> hex digest` function.
///
/// Implementations must be pure: the same input always yields the same
/// output, on every platform, forever. Anything else silently invalidates
/// every block already on disk.
pub trait Hasher: Send + Sync {
    /// Hash `data` and return the digest as lowercase hex.
    fn digest(&self, data: &[u8]) -> String;

    /// Which algorithm this hasher implements.
    fn algorithm(&self) -> HashAlgorithm;
}

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use linkchain_protocol::crypto::sha256;
///
/// let hash = sha256(b"linkchain");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use linkchain_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"linkchain");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// SHA-256 rendered as lowercase hex. The default block hasher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn digest(&self, data: &[u8]) -> String {
        hex::encode(sha256(data))
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
}

/// BLAKE3 rendered as lowercase hex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn digest(&self, data: &[u8]) -> String {
        hex::encode(blake3_hash(data))
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Blake3
    }
}

// ---------------------------------------------------------------------------
// HashAlgorithm
// ---------------------------------------------------------------------------

/// Runtime-selectable hash algorithm.
///
/// Used where the algorithm comes from configuration (CLI flag, config file,
/// the store's metadata tree) rather than from the type system. It is itself
/// a [`Hasher`] that dispatches to the matching implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    /// Stable lowercase name, as persisted in store metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}

impl Hasher for HashAlgorithm {
    fn digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => Sha256Hasher.digest(data),
            HashAlgorithm::Blake3 => Blake3Hasher.digest(data),
        }
    }

    fn algorithm(&self) -> HashAlgorithm {
        *self
    }
}

/// True if `digest` has the shape of a hex digest produced by a [`Hasher`].
pub fn is_hex_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LENGTH && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
