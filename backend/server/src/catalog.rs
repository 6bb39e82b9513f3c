//! # Catalog
//!
//! Channel and video records plus their three indices: the per-channel timeline, the global
//! timeline and the view-score index.
//!
//! ## Invariants
//!
//! - A video is written to its record, both timelines and the score index in one atomic batch
//! - The score index entry is insert-if-absent, re-ingesting a video never resets its views
//! - A video lives in one channel timeline, re-ingesting under another channel moves it
//! - A cascade delete removes a channel's videos from every index in one atomic batch
//!
//! ## Race Window
//!
//! The cascade reads the channel timeline before it deletes. A video ingested between the read
//! and the batch survives without a channel. Readers tolerate that, see [`Catalog::resolve`].
//! Moving a video between channels reads its record first, two concurrent moves of one id can
//! leave it in both timelines.
use std::{collections::HashMap, sync::Arc};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::DEFAULT_TEMP_TTL_SECS,
    error::AppError,
    keys,
    models::{Channel, FeedVideo, Order, Video},
    pool::intersect_rescore_by_view_count,
    store::{KvStore, WriteOp},
    utils::{now, validate_id, validate_url},
};

/// Source of "now" in epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(now)
}

/// Inclusive rank bounds for a page, `None` when the page is empty or past any possible rank.
pub(crate) fn page_bounds(limit: usize, offset: usize) -> Option<(isize, isize)> {
    if limit == 0 {
        return None;
    }

    let start = isize::try_from(offset).ok()?;
    let stop = isize::try_from(limit)
        .ok()
        .and_then(|limit| start.checked_add(limit - 1))
        .unwrap_or(isize::MAX);

    Some((start, stop))
}

pub struct Catalog {
    store: Arc<dyn KvStore>,
    clock: Clock,
    temp_ttl_secs: i64,
}

impl Catalog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: system_clock(),
            temp_ttl_secs: DEFAULT_TEMP_TTL_SECS,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_temp_ttl(mut self, secs: i64) -> Self {
        self.temp_ttl_secs = secs;
        self
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub async fn upsert_channel(
        &self,
        channel_id: &str,
        name: &str,
        avatar: &str,
        description: Option<&str>,
    ) -> Result<Channel, AppError> {
        validate_id("channel", channel_id)?;
        validate_url(avatar)?;

        let channel = Channel {
            id: channel_id.to_string(),
            name: name.trim().to_string(),
            avatar: avatar.to_string(),
            description: description.map(str::to_string),
            last_sync: self.now(),
        };

        let info_key = keys::channel_info(channel_id);
        self.store
            .atomic(vec![
                WriteOp::Del {
                    keys: vec![info_key.clone()],
                },
                WriteOp::HSet {
                    key: info_key,
                    fields: channel.to_fields(),
                },
                WriteOp::SAdd {
                    key: keys::ALL_CHANNELS.to_string(),
                    member: channel_id.to_string(),
                },
            ])
            .await?;

        info!("Saved channel {} ({})", channel.id, channel.name);

        Ok(channel)
    }

    /// Refreshes last-sync without touching the rest of the record.
    pub async fn touch_channel(&self, channel_id: &str) -> Result<(), AppError> {
        self.store
            .hset_all(
                &keys::channel_info(channel_id),
                &[("last_sync".to_string(), self.now().to_string())],
            )
            .await?;

        Ok(())
    }

    /// Takes the resync slot of a channel for `ttl_secs`. `false` when another caller holds it.
    pub async fn claim_resync(&self, channel_id: &str, ttl_secs: i64) -> Result<bool, AppError> {
        if ttl_secs <= 0 {
            return Ok(true);
        }

        Ok(self
            .store
            .set_nx_ex(&keys::resync_claim(channel_id), &self.now().to_string(), ttl_secs)
            .await?)
    }

    pub async fn channel_exists(&self, channel_id: &str) -> Result<bool, AppError> {
        Ok(self.store.exists(&keys::channel_info(channel_id)).await?)
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, AppError> {
        let fields = self.store.hget_all(&keys::channel_info(channel_id)).await?;

        Ok(Channel::from_fields(channel_id, &fields))
    }

    /// Records for `channel_ids`, skipping the ones that no longer exist.
    pub async fn channels_info(&self, channel_ids: &[String]) -> Result<Vec<Channel>, AppError> {
        let mut channels = Vec::with_capacity(channel_ids.len());

        for channel_id in channel_ids {
            if let Some(channel) = self.get_channel(channel_id).await? {
                channels.push(channel);
            }
        }

        Ok(channels)
    }

    pub async fn list_all_channels(&self) -> Result<Vec<Channel>, AppError> {
        let mut channel_ids = self.store.smembers(keys::ALL_CHANNELS).await?;
        channel_ids.sort();

        self.channels_info(&channel_ids).await
    }

    /// Whether the channel was last synced at least `min_interval_secs` ago.
    pub async fn can_resync(
        &self,
        channel_id: &str,
        min_interval_secs: i64,
    ) -> Result<bool, AppError> {
        Ok(match self.get_channel(channel_id).await? {
            Some(channel) => self.now() - channel.last_sync >= min_interval_secs,
            None => true,
        })
    }

    pub async fn ingest_video(
        &self,
        channel_id: &str,
        video_id: &str,
        title: &str,
        thumbnail: &str,
    ) -> Result<Video, AppError> {
        validate_id("channel", channel_id)?;
        validate_id("video", video_id)?;
        validate_url(thumbnail)?;

        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("Empty video title".to_string()));
        }

        let video = Video {
            id: video_id.to_string(),
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            thumbnail: thumbnail.to_string(),
            published_at: self.now(),
        };
        let timestamp = video.published_at as f64;

        let mut ops = Vec::with_capacity(6);
        let previous = self.get_video(video_id).await?;
        if let Some(previous) = previous.filter(|previous| previous.channel_id != channel_id) {
            info!(
                "Moving video {video_id} from channel {} to {channel_id}",
                previous.channel_id
            );
            ops.push(WriteOp::ZRem {
                key: keys::channel_videos(&previous.channel_id),
                members: vec![video_id.to_string()],
            });
        }

        ops.extend([
            WriteOp::HSet {
                key: keys::video(video_id),
                fields: video.to_fields(),
            },
            WriteOp::ZAdd {
                key: keys::channel_videos(channel_id),
                member: video_id.to_string(),
                score: timestamp,
            },
            WriteOp::ZAdd {
                key: keys::ALL_VIDEOS.to_string(),
                member: video_id.to_string(),
                score: timestamp,
            },
            WriteOp::ZAddNx {
                key: keys::VIDEO_SCORES.to_string(),
                member: video_id.to_string(),
                score: 0.0,
            },
            WriteOp::SAdd {
                key: keys::ALL_CHANNELS.to_string(),
                member: channel_id.to_string(),
            },
        ]);

        self.store.atomic(ops).await?;

        #[cfg(feature = "verbose")]
        debug!("Ingested video {} for channel {}", video_id, channel_id);

        Ok(video)
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<Video>, AppError> {
        let fields = self.store.hget_all(&keys::video(video_id)).await?;

        Ok(Video::from_fields(video_id, &fields))
    }

    /// Counts one view. `NotFound` when the video has no score entry.
    pub async fn record_view(&self, video_id: &str) -> Result<u64, AppError> {
        validate_id("video", video_id)?;

        let score = self
            .store
            .zincr_existing(keys::VIDEO_SCORES, video_id, 1.0)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video {video_id}")))?;

        debug!("Video {video_id} +1 view -> {score}");

        Ok(score as u64)
    }

    pub async fn view_score(&self, video_id: &str) -> Result<Option<u64>, AppError> {
        Ok(self
            .store
            .zscore(keys::VIDEO_SCORES, video_id)
            .await?
            .map(|score| score as u64))
    }

    pub async fn list_global_videos(
        &self,
        limit: usize,
        offset: usize,
        order: Order,
    ) -> Result<Vec<String>, AppError> {
        let Some((start, stop)) = page_bounds(limit, offset) else {
            return Ok(Vec::new());
        };

        let key = match order.ranks_by_views() {
            true => keys::VIDEO_SCORES,
            false => keys::ALL_VIDEOS,
        };

        Ok(self
            .store
            .zrange(key, start, stop, order.reads_reversed())
            .await?)
    }

    pub async fn list_channel_videos(
        &self,
        channel_id: &str,
        limit: usize,
        offset: usize,
        order: Order,
    ) -> Result<Vec<String>, AppError> {
        validate_id("channel", channel_id)?;

        let Some((start, stop)) = page_bounds(limit, offset) else {
            return Ok(Vec::new());
        };

        let timeline = keys::channel_videos(channel_id);
        if !order.ranks_by_views() {
            return Ok(self.store.zrange(&timeline, start, stop, true).await?);
        }

        let ranked = keys::temp_inter(&Uuid::new_v4().simple().to_string());
        intersect_rescore_by_view_count(self.store.as_ref(), &ranked, &timeline, self.temp_ttl_secs)
            .await?;

        let page = self
            .store
            .zrange(&ranked, start, stop, order.reads_reversed())
            .await;

        if let Err(e) = self.store.del(&[ranked]).await {
            warn!("Failed to drop scratch set, left to expire: {e}");
        }

        Ok(page?)
    }

    /// Removes a channel and everything reachable from it. Returns the number of videos removed.
    pub async fn delete_channel_cascade(&self, channel_id: &str) -> Result<usize, AppError> {
        let video_ids = self
            .store
            .zrange(&keys::channel_videos(channel_id), 0, -1, false)
            .await?;

        let mut ops = Vec::with_capacity(5);
        if !video_ids.is_empty() {
            ops.push(WriteOp::Del {
                keys: video_ids.iter().map(|id| keys::video(id)).collect(),
            });
            ops.push(WriteOp::ZRem {
                key: keys::ALL_VIDEOS.to_string(),
                members: video_ids.clone(),
            });
            ops.push(WriteOp::ZRem {
                key: keys::VIDEO_SCORES.to_string(),
                members: video_ids.clone(),
            });
        }
        ops.push(WriteOp::Del {
            keys: vec![
                keys::channel_videos(channel_id),
                keys::channel_info(channel_id),
                keys::channel_followers(channel_id),
                keys::resync_claim(channel_id),
            ],
        });
        ops.push(WriteOp::SRem {
            key: keys::ALL_CHANNELS.to_string(),
            member: channel_id.to_string(),
        });

        self.store.atomic(ops).await.map_err(|e| {
            error!("Cascade delete of channel {channel_id} failed: {e}");
            e
        })?;

        info!("Deleted channel {} with {} videos", channel_id, video_ids.len());

        Ok(video_ids.len())
    }

    /// Joins video ids with their records and owning channel, keeping the input order.
    ///
    /// Ids whose record vanished are skipped, a missing channel falls back to placeholders.
    pub async fn resolve(&self, video_ids: &[String]) -> Result<Vec<FeedVideo>, AppError> {
        let mut channels: HashMap<String, Option<Channel>> = HashMap::new();
        let mut feed = Vec::with_capacity(video_ids.len());

        for video_id in video_ids {
            let Some(video) = self.get_video(video_id).await? else {
                warn!("Video {video_id} has no record, skipping");
                continue;
            };

            if !channels.contains_key(&video.channel_id) {
                let channel = self.get_channel(&video.channel_id).await?;
                if channel.is_none() {
                    warn!(
                        "Channel {} missing for video {}, using placeholders",
                        video.channel_id, video_id
                    );
                }
                channels.insert(video.channel_id.clone(), channel);
            }

            let channel = channels.get(&video.channel_id).cloned().flatten();
            feed.push(FeedVideo::join(video, channel));
        }

        Ok(feed)
    }
}
