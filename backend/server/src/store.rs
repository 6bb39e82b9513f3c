//! # Store
//!
//! Typed primitives over the key-value store. Every component receives an
//! `Arc<dyn KvStore>` handle at construction, there is no global connection.
//!
//! ## Primitives
//!
//! - Hashes for channel, video and user records
//! - Sorted sets for timelines (score = ingestion timestamp) and the view-score index
//! - Unordered sets for subscription edges and the channel registry
//! - Lists for session queues
//!
//! Sorted set reads follow Redis ordering: ascending score, ties broken by
//! lexical member order. Reverse reads flip both.
//!
//! ## Atomicity
//!
//! Each single call is atomic. Writes that must land together go through
//! [`KvStore::atomic`], which runs as one `MULTI/EXEC` block on Redis. Nothing
//! else is composed into a transaction.
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Wrong value type at key {key}")]
    WrongType { key: String },

    #[error("Malformed value at key {key}: {reason}")]
    Malformed { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A single write inside an [`KvStore::atomic`] batch.
///
/// Each op yields one integer reply, in the same shape Redis returns it.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Fields newly created.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Members newly added, existing members get the new score.
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Members newly added, existing members keep their score.
    ZAddNx {
        key: String,
        member: String,
        score: f64,
    },
    /// Members removed.
    ZRem { key: String, members: Vec<String> },
    /// 1 if added.
    SAdd { key: String, member: String },
    /// 1 if removed.
    SRem { key: String, member: String },
    /// List length after the push.
    RPush { key: String, values: Vec<String> },
    /// 1 if the key exists and now carries the expiry.
    Expire { key: String, secs: i64 },
    /// Keys removed.
    Del { keys: Vec<String> },
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Increments only members already present. `None` when the member is absent.
    async fn zincr_existing(&self, key: &str, member: &str, delta: f64)
    -> StoreResult<Option<f64>>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Inclusive rank range, negative indices count from the end.
    async fn zrange(&self, key: &str, start: isize, stop: isize, rev: bool)
    -> StoreResult<Vec<String>>;

    async fn zcard(&self, key: &str) -> StoreResult<usize>;

    /// Stores the union of `sources` into `dest`, keeping the max score per
    /// member, then expires `dest` after `ttl_secs`. Returns the member count.
    async fn zunion_max(&self, dest: &str, sources: &[String], ttl_secs: i64)
    -> StoreResult<usize>;

    /// Stores the intersection of `sources` into `dest`, scoring each member
    /// with the weighted sum of its source scores, then expires `dest`.
    async fn zinter_weighted(
        &self,
        dest: &str,
        sources: &[(String, f64)],
        ttl_secs: i64,
    ) -> StoreResult<usize>;

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn scard(&self, key: &str) -> StoreResult<usize>;

    /// Pops up to `count` values from the head of a list.
    async fn lpop(&self, key: &str, count: usize) -> StoreResult<Vec<String>>;

    async fn llen(&self, key: &str) -> StoreResult<usize>;

    async fn del(&self, keys: &[String]) -> StoreResult<usize>;

    /// Sets `key` only when absent, expiring after `ttl_secs`. `true` when this call set it.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: i64) -> StoreResult<bool>;

    async fn atomic(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<i64>>;
}
