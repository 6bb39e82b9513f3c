//! # Sessions
//!
//! A session is a Redis list of shuffled video ids under `session:{id}`.
//!
//! ## Lifecycle
//!
//! - `absent -> populated`: [`SessionStore::init_session`] replaces any prior queue and sets the expiry
//! - `populated -> partially drained -> empty`: [`SessionStore::drain`] pops from the head
//! - any state `-> expired`: the key's TTL runs out, which reads the same as absent
//!
//! Pops are atomic, concurrent drains of one session receive disjoint slices. Two inits of the
//! same session are not serialized, the last write owns the queue.
use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};
use tracing::info;

use crate::{
    config::DEFAULT_SESSION_TTL_SECS,
    error::AppError,
    keys,
    store::{KvStore, WriteOp},
    utils::validate_id,
};

/// Uniform in-place permutation (Fisher-Yates).
pub fn shuffle_pool<R: Rng + ?Sized>(pool: &mut [String], rng: &mut R) {
    pool.shuffle(rng);
}

pub struct SessionStore {
    store: Arc<dyn KvStore>,
    ttl_secs: i64,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, secs: i64) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Shuffles `pool` into a fresh queue. `false` when there is nothing to serve.
    pub async fn init_session(
        &self,
        session_id: &str,
        mut pool: Vec<String>,
    ) -> Result<bool, AppError> {
        validate_id("session", session_id)?;

        if pool.is_empty() {
            return Ok(false);
        }

        shuffle_pool(&mut pool, &mut rand::thread_rng());

        let size = pool.len();
        let key = keys::session(session_id);
        self.store
            .atomic(vec![
                WriteOp::Del {
                    keys: vec![key.clone()],
                },
                WriteOp::RPush {
                    key: key.clone(),
                    values: pool,
                },
                WriteOp::Expire {
                    key,
                    secs: self.ttl_secs,
                },
            ])
            .await?;

        info!("Session {session_id} initialized with {size} videos");

        Ok(true)
    }

    /// Pops up to `count` ids from the head of the queue. Empty once exhausted or expired.
    pub async fn drain(&self, session_id: &str, count: usize) -> Result<Vec<String>, AppError> {
        validate_id("session", session_id)?;

        Ok(self.store.lpop(&keys::session(session_id), count).await?)
    }

    pub async fn remaining(&self, session_id: &str) -> Result<usize, AppError> {
        validate_id("session", session_id)?;

        Ok(self.store.llen(&keys::session(session_id)).await?)
    }
}
