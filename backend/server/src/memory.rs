//! In-process [`KvStore`] with Redis semantics, for tests and local runs without a server.
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{KvStore, StoreError, StoreResult, WriteOp};

enum Value {
    Hash(HashMap<String, String>),
    ZSet(HashMap<String, f64>),
    Set(HashSet<String>),
    List(VecDeque<String>),
    Str(String),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Hash(map) => map.is_empty(),
            Value::ZSet(map) => map.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::Str(_) => false,
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

macro_rules! typed_ref {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self, key: &str) -> StoreResult<Option<&$ty>> {
            match self.live(key) {
                None => Ok(None),
                Some(Entry {
                    value: Value::$variant(inner),
                    ..
                }) => Ok(Some(inner)),
                Some(_) => Err(StoreError::WrongType {
                    key: key.to_string(),
                }),
            }
        }
    };
}

macro_rules! typed_mut {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self, key: &str) -> StoreResult<&mut $ty> {
            self.purge_if_expired(key);
            let entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::$variant(Default::default()),
                expires_at: None,
            });

            match &mut entry.value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(StoreError::WrongType {
                    key: key.to_string(),
                }),
            }
        }
    };
}

impl Keyspace {
    /// Drops `key` if its expiry passed. Returns whether it was dropped.
    fn purge_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= Instant::now());

        if expired {
            self.entries.remove(key);
        }

        expired
    }

    fn live(&mut self, key: &str) -> Option<&Entry> {
        self.purge_if_expired(key);
        self.entries.get(key)
    }

    typed_ref!(hash, Hash, HashMap<String, String>);
    typed_ref!(zset, ZSet, HashMap<String, f64>);
    typed_ref!(set, Set, HashSet<String>);
    typed_ref!(list, List, VecDeque<String>);

    typed_mut!(hash_mut, Hash, HashMap<String, String>);
    typed_mut!(zset_mut, ZSet, HashMap<String, f64>);
    typed_mut!(set_mut, Set, HashSet<String>);
    typed_mut!(list_mut, List, VecDeque<String>);

    /// Redis removes collections once they hold nothing.
    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|entry| entry.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.purge_if_expired(key);
        self.entries.remove(key).is_some()
    }

    fn expire(&mut self, key: &str, secs: i64) -> bool {
        if self.live(key).is_none() {
            return false;
        }

        if secs <= 0 {
            self.entries.remove(key);
            return true;
        }

        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(secs as u64));
        }

        true
    }

    fn store_zset(&mut self, dest: &str, members: HashMap<String, f64>, ttl_secs: i64) -> usize {
        self.entries.remove(dest);

        let count = members.len();
        if count > 0 {
            self.entries.insert(
                dest.to_string(),
                Entry {
                    value: Value::ZSet(members),
                    expires_at: None,
                },
            );
            self.expire(dest, ttl_secs);
        }

        count
    }

    fn apply(&mut self, op: WriteOp) -> StoreResult<i64> {
        let reply = match op {
            WriteOp::HSet { key, fields } => {
                if fields.is_empty() {
                    return Ok(0);
                }

                let hash = self.hash_mut(&key)?;
                fields
                    .into_iter()
                    .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                    .count() as i64
            }
            WriteOp::ZAdd { key, member, score } => {
                self.zset_mut(&key)?.insert(member, score).is_none() as i64
            }
            WriteOp::ZAddNx { key, member, score } => {
                let zset = self.zset_mut(&key)?;
                if zset.contains_key(&member) {
                    0
                } else {
                    zset.insert(member, score);
                    1
                }
            }
            WriteOp::ZRem { key, members } => {
                if self.zset(&key)?.is_none() {
                    return Ok(0);
                }

                let zset = self.zset_mut(&key)?;
                let removed = members
                    .iter()
                    .filter(|member| zset.remove(*member).is_some())
                    .count() as i64;
                self.drop_if_empty(&key);
                removed
            }
            WriteOp::SAdd { key, member } => self.set_mut(&key)?.insert(member) as i64,
            WriteOp::SRem { key, member } => {
                if self.set(&key)?.is_none() {
                    return Ok(0);
                }

                let removed = self.set_mut(&key)?.remove(&member) as i64;
                self.drop_if_empty(&key);
                removed
            }
            WriteOp::RPush { key, values } => {
                if values.is_empty() {
                    return Ok(self.list(&key)?.map_or(0, |list| list.len()) as i64);
                }

                let list = self.list_mut(&key)?;
                list.extend(values);
                list.len() as i64
            }
            WriteOp::Expire { key, secs } => self.expire(&key, secs) as i64,
            WriteOp::Del { keys } => keys.iter().filter(|key| self.remove(key)).count() as i64,
        };

        Ok(reply)
    }
}

/// Ascending score, ties by member, the way Redis orders a sorted set.
fn ordered(zset: &HashMap<String, f64>) -> Vec<(&String, f64)> {
    let mut members: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
    members.sort_by(|(a_member, a_score), (b_member, b_score)| {
        a_score
            .partial_cmp(b_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a_member.cmp(b_member))
    });
    members
}

/// Resolves a Redis-style inclusive rank range against `len` items.
fn rank_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        return None;
    }

    Some((start as usize, stop as usize))
}

#[derive(Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys starting with `prefix`.
    pub async fn count_prefix(&self, prefix: &str) -> usize {
        let mut keyspace = self.keyspace.lock().await;
        let keys: Vec<String> = keyspace
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        keys.iter().filter(|key| keyspace.live(key).is_some()).count()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn hset_all(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        self.keyspace.lock().await.apply(WriteOp::HSet {
            key: key.to_string(),
            fields: fields.to_vec(),
        })?;

        Ok(())
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self
            .keyspace
            .lock()
            .await
            .hash(key)?
            .cloned()
            .unwrap_or_default())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace.lock().await.live(key).is_some())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.keyspace.lock().await.apply(WriteOp::ZAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        })?;

        Ok(())
    }

    async fn zincr_existing(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> StoreResult<Option<f64>> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace
            .zset(key)?
            .is_none_or(|zset| !zset.contains_key(member))
        {
            return Ok(None);
        }

        let zset = keyspace.zset_mut(key)?;
        let score = zset.get(member).copied().unwrap_or_default() + delta;
        zset.insert(member.to_string(), score);

        Ok(Some(score))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self
            .keyspace
            .lock()
            .await
            .zset(key)?
            .and_then(|zset| zset.get(member).copied()))
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        rev: bool,
    ) -> StoreResult<Vec<String>> {
        let mut keyspace = self.keyspace.lock().await;
        let Some(zset) = keyspace.zset(key)? else {
            return Ok(Vec::new());
        };

        let mut members = ordered(zset);
        if rev {
            members.reverse();
        }

        let Some((start, stop)) = rank_bounds(members.len(), start, stop) else {
            return Ok(Vec::new());
        };

        Ok(members[start..=stop]
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect())
    }

    async fn zcard(&self, key: &str) -> StoreResult<usize> {
        Ok(self.keyspace.lock().await.zset(key)?.map_or(0, |zset| zset.len()))
    }

    async fn zunion_max(
        &self,
        dest: &str,
        sources: &[String],
        ttl_secs: i64,
    ) -> StoreResult<usize> {
        let mut keyspace = self.keyspace.lock().await;

        let mut union: HashMap<String, f64> = HashMap::new();
        for source in sources {
            let Some(zset) = keyspace.zset(source)? else {
                continue;
            };

            for (member, score) in zset {
                union
                    .entry(member.clone())
                    .and_modify(|current| *current = current.max(*score))
                    .or_insert(*score);
            }
        }

        Ok(keyspace.store_zset(dest, union, ttl_secs))
    }

    async fn zinter_weighted(
        &self,
        dest: &str,
        sources: &[(String, f64)],
        ttl_secs: i64,
    ) -> StoreResult<usize> {
        let mut keyspace = self.keyspace.lock().await;

        let mut inputs = Vec::with_capacity(sources.len());
        for (source, weight) in sources {
            let zset = keyspace.zset(source)?.cloned().unwrap_or_default();
            inputs.push((zset, *weight));
        }

        let mut intersection: HashMap<String, f64> = HashMap::new();
        if let Some(((first, _), rest)) = inputs.split_first() {
            for member in first.keys() {
                if rest.iter().all(|(zset, _)| zset.contains_key(member)) {
                    let score: f64 = inputs
                        .iter()
                        .map(|(zset, weight)| zset[member] * weight)
                        .sum();
                    intersection.insert(member.clone(), score);
                }
            }
        }

        Ok(keyspace.store_zset(dest, intersection, ttl_secs))
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let reply = self.keyspace.lock().await.apply(WriteOp::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })?;

        Ok(reply > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let reply = self.keyspace.lock().await.apply(WriteOp::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })?;

        Ok(reply > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keyspace
            .lock()
            .await
            .set(key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        Ok(self.keyspace.lock().await.set(key)?.map_or(0, |set| set.len()))
    }

    async fn lpop(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        let mut keyspace = self.keyspace.lock().await;
        if count == 0 || keyspace.list(key)?.is_none() {
            return Ok(Vec::new());
        }

        let list = keyspace.list_mut(key)?;
        let take = count.min(list.len());
        let popped: Vec<String> = list.drain(..take).collect();
        keyspace.drop_if_empty(key);

        Ok(popped)
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        Ok(self.keyspace.lock().await.list(key)?.map_or(0, |list| list.len()))
    }

    async fn del(&self, keys: &[String]) -> StoreResult<usize> {
        let reply = self.keyspace.lock().await.apply(WriteOp::Del {
            keys: keys.to_vec(),
        })?;

        Ok(reply as usize)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: i64) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return Ok(false);
        }

        keyspace.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: None,
            },
        );
        keyspace.expire(key, ttl_secs.max(1));

        Ok(true)
    }

    async fn atomic(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<i64>> {
        let mut keyspace = self.keyspace.lock().await;

        ops.into_iter().map(|op| keyspace.apply(op)).collect()
    }
}
