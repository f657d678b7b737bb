//! # Cryptographic Primitives
//!
//! Only hashing lives here. linkchain has no signatures, no keys and no
//! encryption: tamper evidence comes entirely from each block committing to
//! its own content and to its predecessor's digest.

pub mod hash;

pub use hash::{
    blake3_hash, is_hex_digest, sha256, Blake3Hasher, HashAlgorithm, Hasher, Sha256Hasher,
};
