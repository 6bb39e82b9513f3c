//! # Feed Pool
//!
//! Builds the ranked candidate list of video ids a session is filled from.
//!
//! ## Subscribed Viewers
//!
//! 1. [`union_timelines`] merges every subscribed channel timeline into a scratch set. Scores
//!    there are ingestion timestamps. A video belongs to exactly one channel, so the merge
//!    never has to pick between two scores.
//! 2. [`intersect_rescore_by_view_count`] intersects that scratch set with the view-score index.
//!    The timestamp contributes with weight [`TIMELINE_WEIGHT`] and the view count with
//!    [`VIEW_COUNT_WEIGHT`], so each survivor's score is exactly its view count.
//! 3. The first N ids are read in the requested order. Recency skips step 2 and reads the
//!    merged timeline newest first.
//!
//! ## Fallback
//!
//! An empty subscribed pool (no subscriptions, or channels with nothing ingested yet) falls
//! back to the global index in the same order. An empty catalog yields an empty pool.
//!
//! Scratch sets live under `temp:` with a short expiry and are dropped once read.
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    catalog::Catalog,
    config::DEFAULT_TEMP_TTL_SECS,
    error::AppError,
    keys,
    models::Order,
    store::{KvStore, StoreResult},
    subscriptions::Subscriptions,
    utils::validate_id,
};

/// Weight of the ingestion timestamp when re-scoring a timeline by views.
pub const TIMELINE_WEIGHT: f64 = 0.0;
/// Weight of the view count when re-scoring a timeline by views.
pub const VIEW_COUNT_WEIGHT: f64 = 1.0;

/// Merges the timelines of `channel_ids` into `dest`. Returns the merged size.
pub async fn union_timelines(
    store: &dyn KvStore,
    dest: &str,
    channel_ids: &[String],
    ttl_secs: i64,
) -> StoreResult<usize> {
    let timelines: Vec<String> = channel_ids
        .iter()
        .map(|channel_id| keys::channel_videos(channel_id))
        .collect();

    store.zunion_max(dest, &timelines, ttl_secs).await
}

/// Keeps the members of `source` that have a view score and scores them by it alone.
pub async fn intersect_rescore_by_view_count(
    store: &dyn KvStore,
    dest: &str,
    source: &str,
    ttl_secs: i64,
) -> StoreResult<usize> {
    store
        .zinter_weighted(
            dest,
            &[
                (source.to_string(), TIMELINE_WEIGHT),
                (keys::VIDEO_SCORES.to_string(), VIEW_COUNT_WEIGHT),
            ],
            ttl_secs,
        )
        .await
}

pub struct PoolComposer {
    catalog: Arc<Catalog>,
    subscriptions: Arc<Subscriptions>,
    temp_ttl_secs: i64,
}

impl PoolComposer {
    pub fn new(catalog: Arc<Catalog>, subscriptions: Arc<Subscriptions>) -> Self {
        Self {
            catalog,
            subscriptions,
            temp_ttl_secs: DEFAULT_TEMP_TTL_SECS,
        }
    }

    pub fn with_temp_ttl(mut self, secs: i64) -> Self {
        self.temp_ttl_secs = secs;
        self
    }

    fn store(&self) -> &dyn KvStore {
        self.catalog.store().as_ref()
    }

    /// Up to `size` ids for `user_id`, or for a guest when `None`.
    pub async fn compose(
        &self,
        user_id: Option<&str>,
        size: usize,
        order: Order,
    ) -> Result<Vec<String>, AppError> {
        if size == 0 {
            return Ok(Vec::new());
        }

        if let Some(user_id) = user_id {
            validate_id("user", user_id)?;

            let pool = self.subscription_pool(user_id, size, order).await?;
            if !pool.is_empty() {
                debug!("Subscribed pool for {user_id}: {} videos", pool.len());
                return Ok(pool);
            }
        }

        self.global_pool(size, order).await
    }

    async fn subscription_pool(
        &self,
        user_id: &str,
        size: usize,
        order: Order,
    ) -> Result<Vec<String>, AppError> {
        let channel_ids = self.subscriptions.list_subscriptions(user_id).await?;
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let scope = Uuid::new_v4().simple().to_string();
        let merged = keys::temp_union(&scope);
        let ranked = keys::temp_inter(&scope);

        let pool = self
            .read_subscribed(&channel_ids, &merged, &ranked, size, order)
            .await;

        if let Err(e) = self.store().del(&[merged, ranked]).await {
            warn!("Failed to drop scratch sets for {scope}, left to expire: {e}");
        }

        pool
    }

    async fn read_subscribed(
        &self,
        channel_ids: &[String],
        merged: &str,
        ranked: &str,
        size: usize,
        order: Order,
    ) -> Result<Vec<String>, AppError> {
        let stop = size as isize - 1;

        let count = union_timelines(self.store(), merged, channel_ids, self.temp_ttl_secs).await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        if !order.ranks_by_views() {
            return Ok(self.store().zrange(merged, 0, stop, true).await?);
        }

        intersect_rescore_by_view_count(self.store(), ranked, merged, self.temp_ttl_secs).await?;

        Ok(self
            .store()
            .zrange(ranked, 0, stop, order.reads_reversed())
            .await?)
    }

    async fn global_pool(&self, size: usize, order: Order) -> Result<Vec<String>, AppError> {
        let pool = self.catalog.list_global_videos(size, 0, order).await?;

        if pool.is_empty() && order.ranks_by_views() {
            debug!("Score index empty, falling back to the global timeline");
            return self.catalog.list_global_videos(size, 0, Order::Recency).await;
        }

        Ok(pool)
    }
}
