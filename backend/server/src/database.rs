//! # Redis
//!
//! RAM database.
//!
//! Core purpose is to hold the catalog, the subscription graph and the session queues. Also, used for
//! atomic view-count increments and destructive session pops.
//!
//! ## Requirements
//!
//! - Fast lookups
//! - Atomic increments so concurrent viewers never lose a view
//! - Atomic pops so concurrent drains of one session never see the same video
//! - Set algebra (union/intersection) computed server-side, no round trip per member
//!
//! ## Implementation
//!
//! - Connection manager: reconnects on its own, one retry, short connect timeout
//! - Cheap to clone, every call clones the manager instead of locking a shared connection
//! - Batched writes use `MULTI/EXEC` pipelines
//! - Scratch sets are written and expired in the same pipeline so a crashed request cannot leak them
use std::{collections::HashMap, num::NonZeroUsize, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, Pipeline,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::info;

use crate::store::{KvStore, StoreResult, WriteOp};

pub async fn init_redis(redis_url: &str) -> StoreResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        Ok(Self::new(init_redis(redis_url).await?))
    }
}

fn push_op(pipe: &mut Pipeline, op: WriteOp) {
    match op {
        WriteOp::HSet { key, fields } => {
            pipe.cmd("HSET").arg(key).arg(fields);
        }
        WriteOp::ZAdd { key, member, score } => {
            pipe.cmd("ZADD").arg(key).arg(score).arg(member);
        }
        WriteOp::ZAddNx { key, member, score } => {
            pipe.cmd("ZADD").arg(key).arg("NX").arg(score).arg(member);
        }
        WriteOp::ZRem { key, members } => {
            pipe.cmd("ZREM").arg(key).arg(members);
        }
        WriteOp::SAdd { key, member } => {
            pipe.cmd("SADD").arg(key).arg(member);
        }
        WriteOp::SRem { key, member } => {
            pipe.cmd("SREM").arg(key).arg(member);
        }
        WriteOp::RPush { key, values } => {
            pipe.cmd("RPUSH").arg(key).arg(values);
        }
        WriteOp::Expire { key, secs } => {
            pipe.cmd("EXPIRE").arg(key).arg(secs);
        }
        WriteOp::Del { keys } => {
            pipe.cmd("DEL").arg(keys);
        }
    }
}

/// Ops Redis would reject for having no arguments.
fn is_empty_op(op: &WriteOp) -> bool {
    match op {
        WriteOp::HSet { fields, .. } => fields.is_empty(),
        WriteOp::ZRem { members, .. } => members.is_empty(),
        WriteOp::RPush { values, .. } => values.is_empty(),
        WriteOp::Del { keys } => keys.is_empty(),
        _ => false,
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let _: () = conn.hset_multiple(key, fields).await?;

        Ok(())
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection.clone();

        Ok(conn.hgetall(key).await?)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();

        Ok(conn.exists(key).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.zadd(key, member, score).await?;

        Ok(())
    }

    async fn zincr_existing(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> StoreResult<Option<f64>> {
        let mut conn = self.connection.clone();

        // XX keeps ZINCRBY semantics from creating a score for a deleted video
        let score: Option<f64> = redis::cmd("ZADD")
            .arg(key)
            .arg("XX")
            .arg("INCR")
            .arg(delta)
            .arg(member)
            .query_async(&mut conn)
            .await?;

        Ok(score)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let mut conn = self.connection.clone();

        Ok(conn.zscore(key, member).await?)
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        rev: bool,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();

        let members: Vec<String> = if rev {
            conn.zrevrange(key, start, stop).await?
        } else {
            conn.zrange(key, start, stop).await?
        };

        Ok(members)
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.connection.clone();

        Ok(conn.zcard(key).await?)
    }

    async fn zunion_max(
        &self,
        dest: &str,
        sources: &[String],
        ttl_secs: i64,
    ) -> StoreResult<usize> {
        if sources.is_empty() {
            self.del(&[dest.to_string()]).await?;
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let (count,): (usize,) = redis::pipe()
            .atomic()
            .cmd("ZUNIONSTORE")
            .arg(dest)
            .arg(sources.len())
            .arg(sources)
            .arg("AGGREGATE")
            .arg("MAX")
            .cmd("EXPIRE")
            .arg(dest)
            .arg(ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn zinter_weighted(
        &self,
        dest: &str,
        sources: &[(String, f64)],
        ttl_secs: i64,
    ) -> StoreResult<usize> {
        if sources.is_empty() {
            self.del(&[dest.to_string()]).await?;
            return Ok(0);
        }

        let keys: Vec<&str> = sources.iter().map(|(key, _)| key.as_str()).collect();
        let weights: Vec<f64> = sources.iter().map(|(_, weight)| *weight).collect();

        let mut conn = self.connection.clone();
        let (count,): (usize,) = redis::pipe()
            .atomic()
            .cmd("ZINTERSTORE")
            .arg(dest)
            .arg(keys.len())
            .arg(keys)
            .arg("WEIGHTS")
            .arg(weights)
            .cmd("EXPIRE")
            .arg(dest)
            .arg(ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let added: usize = conn.sadd(key, member).await?;

        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let removed: usize = conn.srem(key, member).await?;

        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection.clone();

        Ok(conn.smembers(key).await?)
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.connection.clone();

        Ok(conn.scard(key).await?)
    }

    async fn lpop(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Ok(Vec::new());
        };

        let mut conn = self.connection.clone();
        let values: Option<Vec<String>> = conn.lpop(key, Some(count)).await?;

        Ok(values.unwrap_or_default())
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        let mut conn = self.connection.clone();

        Ok(conn.llen(key).await?)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();

        Ok(conn.del(keys).await?)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: i64) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn atomic(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<i64>> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        // Skipped ops still answer 0 so replies stay aligned with the caller's batch
        let mut kept = Vec::with_capacity(ops.len());
        for op in ops {
            let empty = is_empty_op(&op);
            kept.push(!empty);

            if !empty {
                push_op(&mut pipe, op);
            }
        }

        if !kept.iter().any(|&k| k) {
            return Ok(vec![0; kept.len()]);
        }

        let mut conn = self.connection.clone();
        let replies: Vec<i64> = pipe.query_async(&mut conn).await?;

        let mut replies = replies.into_iter();
        Ok(kept
            .into_iter()
            .map(|k| if k { replies.next().unwrap_or(0) } else { 0 })
            .collect())
    }
}
