//! # Storage Module
//!
//! The chain itself: block records, the stores that persist them, and the
//! engine that appends and validates them.
//!
//! ## Architecture
//!
//! ```text
//! block.rs   Block record and its canonical encoding
//! db.rs      Store trait, sled and in-memory stores
//! chain.rs   ChainEngine: bootstrap, append, read, validate
//! tamper.rs  unchecked overwrites for exercising validation
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! payload → ChainEngine ─ Block ─ canonical JSON ─► Store (height → bytes)
//!                ▲                                      │
//!                └──────── recompute + cross-check ◄────┘
//! ```

pub mod block;
pub mod chain;
pub mod db;
pub mod tamper;

pub use block::Block;
pub use chain::{BlockVerdict, ChainEngine, ChainError, ChainResult, FailureKind, ValidationReport};
pub use db::{MemoryStore, SledStore, Store, StoreError, StoreResult};
pub use tamper::TamperStore;
