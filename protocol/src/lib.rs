// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # linkchain Core Library
//!
//! A linear, tamper-evident log of immutable blocks. Each block commits to
//! its own content and to the hash of the block before it, is persisted in an
//! ordered key-value store, and can be re-verified at any time.
//!
//! ## Architecture
//!
//! - **crypto**: the [`Hasher`](crypto::Hasher) seam and its SHA-256 /
//!   BLAKE3 implementations.
//! - **storage**: blocks, stores and the [`ChainEngine`](storage::ChainEngine).
//! - **config**: chain constants and runtime settings.
//!
//! ## Quick Start
//!
//! ```
//! use linkchain_protocol::crypto::Sha256Hasher;
//! use linkchain_protocol::storage::{ChainEngine, MemoryStore};
//!
//! let chain = ChainEngine::new(MemoryStore::new(), Sha256Hasher);
//! chain.bootstrap().unwrap();
//! chain.append("hello").unwrap();
//! assert_eq!(chain.height().unwrap(), Some(1));
//! assert!(chain.validate_chain().unwrap().is_valid());
//! ```

pub mod config;
pub mod crypto;
pub mod storage;
