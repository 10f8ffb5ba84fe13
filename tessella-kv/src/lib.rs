//! # Tessella KV
//!
//! The ordered-KV contract consumed by the Tessella store, plus the
//! in-memory engine that implements it.
//!
//! This crate provides:
//! - [`KvDatabase`] / [`KvTransaction`]: the transactional contract —
//!   snapshot point reads, selector-bounded ranged reads, buffered
//!   writes, and little-endian 64-bit atomic add
//! - [`run`]: the bounded-retry transaction envelope
//! - [`range_stream`]: lazy paging over a ranged read
//! - [`MemoryKv`]: an optimistic in-memory engine with real conflict
//!   detection, for tests and embedded stores
//!
//! Production deployments implement the contract traits over their ordered
//! KV substrate of choice; the store layer is generic over [`KvDatabase`].

pub mod memory;
pub mod transaction;

pub use memory::{MemoryKv, MemoryTransaction};
pub use transaction::{
    range_stream, run, KeySelector, KeyValue, KvDatabase, KvTransaction, DEFAULT_RETRY_ATTEMPTS,
    MAX_KEY_BYTES, MAX_TRANSACTION_BYTES, MAX_TRANSACTION_DURATION, MAX_VALUE_BYTES,
    RANGE_PAGE_SIZE,
};
