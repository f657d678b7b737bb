//! # Chain Configuration & Constants
//!
//! Every magic value in linkchain lives here. Several of them are baked into
//! the hashes of blocks already on disk (the genesis payload, the canonical
//! field names), so treat this file as append-only once a chain exists.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::HashAlgorithm;

// ---------------------------------------------------------------------------
// Protocol Constants
// ---------------------------------------------------------------------------

/// The full version string of the chain format.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Payload carried by the genesis block. Part of the genesis hash: changing
/// it forks every chain ever created.
pub const GENESIS_PAYLOAD: &str = "First block in the chain - Genesis Block";

/// `previousBlockHash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "";

/// Value the `hash` field takes while a block is being hashed.
pub const BLANK_HASH: &str = "";

/// Length of a hex-encoded 256-bit digest.
pub const DIGEST_HEX_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Storage Layout
// ---------------------------------------------------------------------------

/// sled tree holding serialized blocks keyed by big-endian height.
pub const BLOCKS_TREE: &str = "blocks";

/// sled tree holding chain metadata.
pub const METADATA_TREE: &str = "metadata";

/// Metadata key recording the hash algorithm a chain was created with.
pub const META_HASH_ALGORITHM: &[u8] = b"hash_algorithm";

/// Metadata key recording the chain format version.
pub const META_PROTOCOL_VERSION: &[u8] = b"protocol_version";

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime settings for opening and operating a chain.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides:
///
/// ```json
/// { "data_dir": "/var/lib/linkchain", "hash_algorithm": "blake3" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Directory holding the sled database.
    pub data_dir: PathBuf,
    /// Digest algorithm for block hashes. Fixed per chain.
    pub hash_algorithm: HashAlgorithm,
    /// Validate heights on the rayon pool instead of one by one.
    pub parallel_validation: bool,
    /// Flush the store to disk after every append.
    pub flush_on_append: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("linkchain-data"),
            hash_algorithm: HashAlgorithm::default(),
            parallel_validation: true,
            flush_on_append: true,
        }
    }
}

impl ChainConfig {
    /// Load a JSON config file. Missing keys take their default values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sha256_parallel_durable() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.hash_algorithm, HashAlgorithm::Sha256);
        assert!(cfg.parallel_validation);
        assert!(cfg.flush_on_append);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkchain.json");
        std::fs::write(&path, r#"{ "hash_algorithm": "blake3" }"#).unwrap();

        let cfg = ChainConfig::load(&path).unwrap();
        assert_eq!(cfg.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(cfg.data_dir, ChainConfig::default().data_dir);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ChainConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ChainConfig::load(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
