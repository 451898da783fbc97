//! Key-value persistence contract for entity state.
//!
//! This crate defines the semantic contract the saga engine expects from its
//! backing store (a Redis-like cache in production): JSON documents addressed
//! by string keys, atomic counters, and membership sets. The concrete cache
//! client lives outside this workspace; the in-memory implementation here
//! serves tests and local runs.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{Result, StateStoreError};
pub use memory::InMemoryStateStore;
pub use store::StateStore;
