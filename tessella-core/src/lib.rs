//! # Tessella Core
//!
//! Leaf crate for the Tessella triple store.
//!
//! This crate provides:
//! - Core types: [`Triple`], [`TriplePattern`], [`UriId`], [`IdTriple`]
//! - The order-preserving tuple key codec ([`tuple`])
//! - The key schema mapping triples onto 4 covering indexes ([`KeySpace`])
//! - Index selection for triple patterns ([`QueryPlan`])
//!
//! ## Design Principles
//!
//! 1. **Pure**: no I/O, no async, no interior mutability
//! 2. **On-disk contract**: key layout is stable and interoperable across
//!    implementations sharing a root prefix
//! 3. **Prefix scans only**: every pattern maps to one covering index, with
//!    a single post-filtered exception documented in [`index`]

pub mod error;
pub mod ids;
pub mod index;
pub mod keys;
pub mod triple;
pub mod tuple;

pub use error::{Error, Result};
pub use ids::{IdTriple, UriId};
pub use index::{IndexType, QueryPlan};
pub use keys::KeySpace;
pub use triple::{Triple, TriplePattern};
