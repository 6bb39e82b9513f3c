use std::sync::Arc;

use tracing::info;

use super::{
    catalog::Catalog,
    config::Config,
    crawler::HttpChannelSource,
    database::RedisStore,
    error::AppError,
    ingest::{ChannelSource, Ingestor},
    pool::PoolComposer,
    session::SessionStore,
    store::KvStore,
    subscriptions::Subscriptions,
};

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub subscriptions: Arc<Subscriptions>,
    pub pool: PoolComposer,
    pub sessions: SessionStore,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        info!("Connecting to Redis at {}", config.redis_url);
        let store = RedisStore::connect(&config.redis_url).await?;
        let source = HttpChannelSource::new()?;

        Ok(Self::with_parts(config, Arc::new(store), Arc::new(source)))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn KvStore>,
        source: Arc<dyn ChannelSource>,
    ) -> Arc<Self> {
        let catalog = Arc::new(
            Catalog::new(store.clone()).with_temp_ttl(config.temp_ttl_secs),
        );
        let subscriptions = Arc::new(Subscriptions::new(catalog.clone()));
        let pool = PoolComposer::new(catalog.clone(), subscriptions.clone())
            .with_temp_ttl(config.temp_ttl_secs);
        let sessions = SessionStore::new(store).with_ttl(config.session_ttl_secs);
        let ingestor = Arc::new(
            Ingestor::new(catalog.clone(), subscriptions.clone(), source)
                .with_min_resync_interval(config.resync_min_interval_secs)
                .with_video_limit(config.crawl_video_limit),
        );

        Arc::new(Self {
            config,
            catalog,
            subscriptions,
            pool,
            sessions,
            ingestor,
        })
    }
}
