use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use shorts_server::{
    catalog::{Catalog, Clock},
    config::Config,
    error::AppError,
    ingest::{ChannelDetails, ChannelSource, Ingestor, ResyncStatus, VideoListing},
    memory::MemoryStore,
    models::Order,
    state::AppState,
    subscriptions::Subscriptions,
};

const THUMB: &str = "https://i.ytimg.com/vi/x/hqdefault.jpg";

#[derive(Default)]
struct StaticSource {
    channels: HashMap<String, Vec<String>>,
}

impl StaticSource {
    fn with_channel(mut self, channel_id: &str, videos: &[&str]) -> Self {
        self.channels.insert(
            channel_id.to_string(),
            videos.iter().map(|id| id.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl ChannelSource for StaticSource {
    async fn resolve_channel_id(&self, url: &str) -> Result<Option<String>, AppError> {
        Ok(url.rsplit('/').next().map(str::to_string))
    }

    async fn channel_details(&self, channel_id: &str) -> Result<ChannelDetails, AppError> {
        Ok(ChannelDetails {
            name: format!("Channel {channel_id}"),
            avatar: "https://yt3.ggpht.com/avatar.jpg".to_string(),
            description: Some("Shorts".to_string()),
        })
    }

    async fn latest_videos(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<VideoListing>, AppError> {
        let videos = self.channels.get(channel_id).cloned().unwrap_or_default();

        Ok(videos
            .into_iter()
            .take(limit)
            .map(|video_id| VideoListing {
                title: format!("Short {video_id}"),
                thumbnail: format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"),
                video_id,
            })
            .collect())
    }
}

fn state() -> Arc<AppState> {
    AppState::with_parts(
        Config::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticSource::default()),
    )
}

async fn ingest(state: &AppState, channel_id: &str, video_ids: &[&str]) {
    for video_id in video_ids {
        state
            .catalog
            .ingest_video(channel_id, video_id, video_id, THUMB)
            .await
            .unwrap();
    }
}

async fn view(state: &AppState, video_id: &str, times: usize) {
    for _ in 0..times {
        state.catalog.record_view(video_id).await.unwrap();
    }
}

#[tokio::test]
async fn test_reingesting_keeps_view_score() {
    let state = state();
    ingest(&state, "UC1", &["v1"]).await;
    view(&state, "v1", 3).await;

    ingest(&state, "UC1", &["v1"]).await;

    assert_eq!(state.catalog.view_score("v1").await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_channel_removed_with_last_follower() {
    let state = state();
    ingest(&state, "UC1", &["v1", "v2"]).await;
    ingest(&state, "UC2", &["v3"]).await;

    state.subscriptions.subscribe("u1", "UC1").await.unwrap();
    state.subscriptions.subscribe("u2", "UC1").await.unwrap();

    assert!(!state.subscriptions.unsubscribe("u1", "UC1").await.unwrap());
    assert_eq!(state.subscriptions.list_followers("UC1").await.unwrap(), 1);
    assert!(state.catalog.get_video("v1").await.unwrap().is_some());

    assert!(state.subscriptions.unsubscribe("u2", "UC1").await.unwrap());
    assert!(state.catalog.get_video("v1").await.unwrap().is_none());
    assert_eq!(state.catalog.view_score("v2").await.unwrap(), None);

    let remaining = state
        .catalog
        .list_global_videos(10, 0, Order::Recency)
        .await
        .unwrap();
    assert_eq!(remaining, ["v3"]);
}

#[tokio::test]
async fn test_session_serves_each_video_once() {
    let state = state();
    let ids: Vec<String> = (0..12).map(|i| format!("v{i:02}")).collect();
    for id in &ids {
        ingest(&state, "UC1", &[id]).await;
    }

    let pool = state.pool.compose(None, 500, Order::default()).await.unwrap();
    assert!(state.sessions.init_session("tab", pool).await.unwrap());

    let mut served = Vec::new();
    loop {
        let page = state.sessions.drain("tab", 5).await.unwrap();
        if page.is_empty() {
            break;
        }
        served.extend(page);
    }

    let unique: HashSet<&String> = served.iter().collect();
    assert_eq!(served.len(), ids.len());
    assert_eq!(unique.len(), ids.len());
    assert_eq!(state.sessions.remaining("tab").await.unwrap(), 0);
}

#[tokio::test]
async fn test_pool_limited_to_subscribed_channels() {
    let state = state();
    ingest(&state, "UCA", &["a1", "a2"]).await;
    ingest(&state, "UCB", &["b1"]).await;
    ingest(&state, "UCC", &["c1", "c2"]).await;

    state.subscriptions.subscribe("u1", "UCA").await.unwrap();
    state.subscriptions.subscribe("u1", "UCB").await.unwrap();

    let mut pool = state
        .pool
        .compose(Some("u1"), 500, Order::default())
        .await
        .unwrap();
    pool.sort();

    assert_eq!(pool, ["a1", "a2", "b1"]);
}

#[tokio::test]
async fn test_views_reorder_fair_pool() {
    let state = state();
    ingest(&state, "UC1", &["v1", "v2"]).await;
    state.subscriptions.subscribe("u1", "UC1").await.unwrap();
    view(&state, "v1", 5).await;
    view(&state, "v2", 1).await;

    let pool = state
        .pool
        .compose(Some("u1"), 500, Order::ScoreAscending)
        .await
        .unwrap();
    assert_eq!(pool, ["v2", "v1"]);

    view(&state, "v2", 10).await;

    let pool = state
        .pool
        .compose(Some("u1"), 500, Order::ScoreAscending)
        .await
        .unwrap();
    assert_eq!(pool, ["v1", "v2"]);

    let pool = state
        .pool
        .compose(Some("u1"), 500, Order::ScoreDescending)
        .await
        .unwrap();
    assert_eq!(pool, ["v2", "v1"]);
}

#[tokio::test]
async fn test_user_without_subscriptions_gets_guest_pool() {
    let state = state();
    ingest(&state, "UC1", &["v1", "v2"]).await;
    ingest(&state, "UC2", &["v3"]).await;
    view(&state, "v2", 2).await;

    let guest = state.pool.compose(None, 500, Order::default()).await.unwrap();
    let user = state
        .pool
        .compose(Some("u-new"), 500, Order::default())
        .await
        .unwrap();

    assert_eq!(user, guest);
    assert_eq!(guest, ["v1", "v3", "v2"]);
}

#[tokio::test]
async fn test_resync_throttled_within_interval() {
    let time = Arc::new(AtomicI64::new(10_000));
    let clock_time = time.clone();
    let clock: Clock = Arc::new(move || clock_time.load(Ordering::SeqCst));

    let catalog = Arc::new(Catalog::new(Arc::new(MemoryStore::new())).with_clock(clock));
    let subscriptions = Arc::new(Subscriptions::new(catalog.clone()));
    let source = StaticSource::default().with_channel("UC1", &["v1", "v2"]);
    let ingestor = Ingestor::new(catalog.clone(), subscriptions, Arc::new(source))
        .with_min_resync_interval(600);

    catalog
        .upsert_channel("UC1", "Channel", "https://yt3.ggpht.com/a.jpg", None)
        .await
        .unwrap();
    time.fetch_add(3_600, Ordering::SeqCst);

    assert_eq!(
        ingestor.request_resync("UC1").await.unwrap(),
        ResyncStatus::Synced(2)
    );

    time.fetch_add(300, Ordering::SeqCst);
    assert_eq!(
        ingestor.request_resync("UC1").await.unwrap(),
        ResyncStatus::Ignored
    );

    let channel = catalog.get_channel("UC1").await.unwrap().unwrap();
    assert_eq!(channel.name, "Channel UC1");
    assert_eq!(channel.last_sync, 13_600);
}
