use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Core trait for state store implementations.
///
/// The store holds JSON documents addressed by string keys, plus two
/// primitives the saga engine depends on beyond plain get/set:
///
/// - **atomic counters** — `increment` must be atomic at the storage layer
///   (never read-modify-write), so concurrently delivered per-item results
///   for the same bulk cannot lose updates;
/// - **membership sets** — used to track the sub-entity ids owned by an
///   aggregate root without rewriting the root document.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Retrieves the document stored under `key`.
    ///
    /// Returns `None`, never an error, if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any existing document.
    ///
    /// Idempotent full-document upsert.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removes the value stored under `key` — document, counter, or set;
    /// the three share one keyspace.
    ///
    /// Fails with `NotFound` if the key is absent.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Returns true if any value (document, counter, or set) exists under
    /// `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `delta` to the counter at `key` and returns the
    /// post-increment value. Absent counters start at 0.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64>;

    /// Reads the counter at `key`, returning 0 if absent.
    async fn counter(&self, key: &str) -> Result<i64>;

    /// Adds `member` to the set at `key`. Adding an existing member is a
    /// no-op.
    async fn add_set_member(&self, key: &str, member: &str) -> Result<()>;

    /// Returns the members of the set at `key`, empty if absent.
    ///
    /// Member order is stable across calls but otherwise unspecified.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}
