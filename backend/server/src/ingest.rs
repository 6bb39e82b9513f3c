//! # Ingestion
//!
//! Drives the catalog from a [`ChannelSource`]: full channel syncs, throttled resyncs and the
//! "add channel" flow.
//!
//! ## Resync Throttle
//!
//! A channel synced less than `min_resync_interval_secs` ago is not synced again, the request
//! is answered with [`ResyncStatus::Ignored`]. A request that passes the check must also take the
//! channel's resync claim (`SET NX EX` for one interval), so of several concurrent requests only
//! one crawls. Last-sync is stamped before the crawl starts.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    catalog::Catalog,
    config::DEFAULT_RESYNC_MIN_INTERVAL_SECS,
    error::AppError,
    models::{PLACEHOLDER_AVATAR, PLACEHOLDER_CHANNEL_NAME},
    subscriptions::Subscriptions,
    utils::{validate_id, validate_youtube_url},
};

#[derive(Debug, Clone, PartialEq)]
pub struct VideoListing {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDetails {
    pub name: String,
    pub avatar: String,
    pub description: Option<String>,
}

/// The crawler side of ingestion.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Channel id behind a channel or video url, `None` when the page names no channel.
    async fn resolve_channel_id(&self, url: &str) -> Result<Option<String>, AppError>;

    async fn channel_details(&self, channel_id: &str) -> Result<ChannelDetails, AppError>;

    /// Newest videos first, at most `limit`.
    async fn latest_videos(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<VideoListing>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "videos", rename_all = "snake_case")]
pub enum ResyncStatus {
    Synced(usize),
    Ignored,
}

pub struct Ingestor {
    catalog: Arc<Catalog>,
    subscriptions: Arc<Subscriptions>,
    source: Arc<dyn ChannelSource>,
    min_resync_interval_secs: i64,
    video_limit: usize,
}

impl Ingestor {
    pub fn new(
        catalog: Arc<Catalog>,
        subscriptions: Arc<Subscriptions>,
        source: Arc<dyn ChannelSource>,
    ) -> Self {
        Self {
            catalog,
            subscriptions,
            source,
            min_resync_interval_secs: DEFAULT_RESYNC_MIN_INTERVAL_SECS,
            video_limit: 100,
        }
    }

    pub fn with_min_resync_interval(mut self, secs: i64) -> Self {
        self.min_resync_interval_secs = secs;
        self
    }

    pub fn with_video_limit(mut self, limit: usize) -> Self {
        self.video_limit = limit;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Ingests the channel's latest videos, then refreshes its record. Returns the ingested count.
    pub async fn sync_channel(&self, channel_id: &str) -> Result<usize, AppError> {
        validate_id("channel", channel_id)?;
        info!("Syncing channel {channel_id}");

        let listings = self
            .source
            .latest_videos(channel_id, self.video_limit)
            .await?;

        let mut ingested = 0;
        for listing in listings {
            match self
                .catalog
                .ingest_video(channel_id, &listing.video_id, &listing.title, &listing.thumbnail)
                .await
            {
                Ok(_) => ingested += 1,
                Err(AppError::InvalidInput(reason)) => {
                    warn!("Skipping video {}: {reason}", listing.video_id);
                }
                Err(e) => return Err(e),
            }
        }

        let details = self.source.channel_details(channel_id).await?;
        self.catalog
            .upsert_channel(
                channel_id,
                &details.name,
                &details.avatar,
                details.description.as_deref(),
            )
            .await?;

        info!("Synced {ingested} videos for channel {channel_id}");

        Ok(ingested)
    }

    pub async fn can_resync(&self, channel_id: &str) -> Result<bool, AppError> {
        self.catalog
            .can_resync(channel_id, self.min_resync_interval_secs)
            .await
    }

    pub async fn request_resync(&self, channel_id: &str) -> Result<ResyncStatus, AppError> {
        validate_id("channel", channel_id)?;

        if !self.catalog.channel_exists(channel_id).await? {
            return Err(AppError::NotFound(format!("channel {channel_id}")));
        }

        if !self.can_resync(channel_id).await? {
            info!("Resync of {channel_id} ignored, synced recently");
            return Ok(ResyncStatus::Ignored);
        }

        if !self
            .catalog
            .claim_resync(channel_id, self.min_resync_interval_secs)
            .await?
        {
            info!("Resync of {channel_id} ignored, already claimed");
            return Ok(ResyncStatus::Ignored);
        }

        self.catalog.touch_channel(channel_id).await?;

        Ok(ResyncStatus::Synced(self.sync_channel(channel_id).await?))
    }

    /// Subscribes `user_id` to the channel behind `url` right away and syncs it in the background.
    pub async fn add_channel(self: &Arc<Self>, user_id: &str, url: &str) -> Result<String, AppError> {
        validate_id("user", user_id)?;
        let url = validate_youtube_url(url)?;

        let channel_id = self
            .source
            .resolve_channel_id(url.as_str())
            .await?
            .ok_or_else(|| AppError::InvalidInput("No channel id found behind url".to_string()))?;
        validate_id("channel", &channel_id)?;

        self.subscriptions.subscribe(user_id, &channel_id).await?;

        if !self.catalog.channel_exists(&channel_id).await? {
            self.catalog
                .upsert_channel(&channel_id, PLACEHOLDER_CHANNEL_NAME, PLACEHOLDER_AVATAR, None)
                .await?;
        }

        let ingestor = Arc::clone(self);
        let background_id = channel_id.clone();
        tokio::spawn(async move {
            if let Err(e) = ingestor.sync_channel(&background_id).await {
                error!("Background sync of {background_id} failed: {e}");
            }
        });

        Ok(channel_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicI64, AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{catalog::Clock, memory::MemoryStore};

    /// Canned crawler counting its listing calls.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub(crate) channels: HashMap<String, Vec<VideoListing>>,
        pub(crate) listing_calls: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn with_channel(mut self, channel_id: &str, videos: &[&str]) -> Self {
            let listings = videos
                .iter()
                .map(|id| VideoListing {
                    video_id: id.to_string(),
                    title: format!("title {id}"),
                    thumbnail: format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"),
                })
                .collect();
            self.channels.insert(channel_id.to_string(), listings);
            self
        }
    }

    #[async_trait]
    impl ChannelSource for FakeSource {
        async fn resolve_channel_id(&self, url: &str) -> Result<Option<String>, AppError> {
            Ok(url.rsplit('/').next().map(str::to_string))
        }

        async fn channel_details(&self, channel_id: &str) -> Result<ChannelDetails, AppError> {
            Ok(ChannelDetails {
                name: format!("Channel {channel_id}"),
                avatar: "https://yt3.ggpht.com/a.jpg".to_string(),
                description: None,
            })
        }

        async fn latest_videos(
            &self,
            channel_id: &str,
            limit: usize,
        ) -> Result<Vec<VideoListing>, AppError> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);

            Ok(self
                .channels
                .get(channel_id)
                .map(|videos| videos.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }
    }

    struct Fixture {
        time: Arc<AtomicI64>,
        catalog: Arc<Catalog>,
        subscriptions: Arc<Subscriptions>,
        source: Arc<FakeSource>,
        ingestor: Arc<Ingestor>,
    }

    fn fixture(source: FakeSource) -> Fixture {
        let time = Arc::new(AtomicI64::new(100_000));
        let clock_time = time.clone();
        let clock: Clock = Arc::new(move || clock_time.load(Ordering::SeqCst));

        let catalog = Arc::new(Catalog::new(Arc::new(MemoryStore::new())).with_clock(clock));
        let subscriptions = Arc::new(Subscriptions::new(catalog.clone()));
        let source = Arc::new(source);
        let ingestor = Arc::new(Ingestor::new(
            catalog.clone(),
            subscriptions.clone(),
            source.clone(),
        ));

        Fixture {
            time,
            catalog,
            subscriptions,
            source,
            ingestor,
        }
    }

    #[tokio::test]
    async fn test_sync_ingests_and_refreshes_channel() {
        let f = fixture(FakeSource::default().with_channel("UC1", &["v1", "v2"]));

        assert_eq!(f.ingestor.sync_channel("UC1").await.unwrap(), 2);

        let channel = f.catalog.get_channel("UC1").await.unwrap().unwrap();
        assert_eq!(channel.name, "Channel UC1");
        assert_eq!(f.catalog.view_score("v2").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_sync_respects_video_limit() {
        let source = FakeSource::default().with_channel("UC1", &["v1", "v2", "v3"]);
        let f = fixture(source);
        let ingestor = Ingestor::new(f.catalog.clone(), f.subscriptions.clone(), f.source.clone())
            .with_video_limit(2);

        assert_eq!(ingestor.sync_channel("UC1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resync_twice_within_window_is_ignored() {
        let f = fixture(FakeSource::default().with_channel("UC1", &["v1"]));

        f.ingestor.sync_channel("UC1").await.unwrap();
        f.time.fetch_add(3_600, Ordering::SeqCst);

        assert_eq!(
            f.ingestor.request_resync("UC1").await.unwrap(),
            ResyncStatus::Synced(1)
        );

        f.time.fetch_add(5 * 60, Ordering::SeqCst);
        assert_eq!(
            f.ingestor.request_resync("UC1").await.unwrap(),
            ResyncStatus::Ignored
        );
        assert_eq!(f.source.listing_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resyncs_crawl_once() {
        let f = fixture(FakeSource::default().with_channel("UC1", &["v1"]));

        f.catalog
            .upsert_channel("UC1", "One", "https://yt3.ggpht.com/a.jpg", None)
            .await
            .unwrap();
        f.time.fetch_add(3_600, Ordering::SeqCst);

        let requests: Vec<_> = (0..8)
            .map(|_| {
                let ingestor = f.ingestor.clone();
                tokio::spawn(async move { ingestor.request_resync("UC1").await })
            })
            .collect();

        let mut synced = 0;
        for request in requests {
            if let ResyncStatus::Synced(_) = request.await.unwrap().unwrap() {
                synced += 1;
            }
        }

        assert_eq!(synced, 1);
        assert_eq!(f.source.listing_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resync_unknown_channel() {
        let f = fixture(FakeSource::default());

        assert!(matches!(
            f.ingestor.request_resync("UC404").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_channel_subscribes_before_sync() {
        let f = fixture(FakeSource::default().with_channel("UC1", &["v1"]));

        let channel_id = f
            .ingestor
            .add_channel("u1", "https://www.youtube.com/channel/UC1")
            .await
            .unwrap();

        assert_eq!(channel_id, "UC1");
        assert_eq!(f.subscriptions.list_subscriptions("u1").await.unwrap(), ["UC1"]);
        assert!(f.catalog.channel_exists("UC1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_channel_rejects_foreign_urls() {
        let f = fixture(FakeSource::default());

        assert!(matches!(
            f.ingestor.add_channel("u1", "https://vimeo.com/UC1").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(f.subscriptions.list_subscriptions("u1").await.unwrap().is_empty());
    }

    #[test]
    fn test_resync_status_json() {
        assert_eq!(
            serde_json::to_value(ResyncStatus::Synced(3)).unwrap(),
            serde_json::json!({"status": "synced", "videos": 3})
        );
        assert_eq!(
            serde_json::to_value(ResyncStatus::Ignored).unwrap(),
            serde_json::json!({"status": "ignored"})
        );
    }
}
