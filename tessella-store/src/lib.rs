//! # Tessella Store
//!
//! An RDF triple store implemented as a thin layer over an ordered,
//! transactional KV substrate.
//!
//! This crate provides:
//! - [`Store`]: the public facade — insert, delete, contains, count, and
//!   streaming pattern queries, each a single retryable transaction
//! - [`Dictionary`] / [`InternSession`]: URI interning with a shared
//!   committed-only cache
//! - [`IndexSet`]: the four covering indexes written in lockstep
//!
//! ## Example
//!
//! ```ignore
//! use tessella_store::{MemoryKv, Store, Triple, TriplePattern};
//!
//! let store = Store::new(MemoryKv::new(), "my-graph");
//! store.insert(&Triple::new("alice", "knows", "bob")?).await?;
//! let known = store.query_collect(&TriplePattern::subject("alice")).await?;
//! ```

pub mod dictionary;
pub mod index_set;
mod query;
pub mod store;

pub use dictionary::{Dictionary, InternSession};
pub use index_set::IndexSet;
pub use store::{Store, StoreOptions};

// Re-export the types callers need to use the store.
pub use tessella_core::{Error, IdTriple, IndexType, Result, Triple, TriplePattern, UriId};
pub use tessella_kv::{KvDatabase, KvTransaction, MemoryKv};
