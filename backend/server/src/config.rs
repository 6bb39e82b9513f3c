use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_SESSION_TTL_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_TEMP_TTL_SECS: i64 = 60;
pub const DEFAULT_RESYNC_MIN_INTERVAL_SECS: i64 = 10 * 60;
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub pool_size: usize,
    pub page_size: usize,
    pub max_page_size: usize,
    pub session_ttl_secs: i64,
    pub temp_ttl_secs: i64,
    pub resync_min_interval_secs: i64,
    pub resync_period_secs: u64,
    pub crawl_video_limit: usize,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            redis_url: "redis://localhost:6379".to_string(),
            pool_size: 500,
            page_size: 5,
            max_page_size: 50,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            temp_ttl_secs: DEFAULT_TEMP_TTL_SECS,
            resync_min_interval_secs: DEFAULT_RESYNC_MIN_INTERVAL_SECS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            crawl_video_limit: 100,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();

        Self {
            port: try_load("RUST_PORT", defaults.port),
            redis_url: try_load("REDIS_URL", defaults.redis_url),
            pool_size: try_load("FEED_POOL_SIZE", defaults.pool_size),
            page_size: try_load("FEED_PAGE_SIZE", defaults.page_size),
            max_page_size: try_load("FEED_MAX_PAGE_SIZE", defaults.max_page_size),
            session_ttl_secs: try_load("SESSION_TTL_SECS", defaults.session_ttl_secs),
            temp_ttl_secs: try_load("TEMP_TTL_SECS", defaults.temp_ttl_secs),
            resync_min_interval_secs: try_load(
                "RESYNC_MIN_INTERVAL_SECS",
                defaults.resync_min_interval_secs,
            ),
            resync_period_secs: try_load("RESYNC_PERIOD_SECS", defaults.resync_period_secs),
            crawl_video_limit: try_load("CRAWL_VIDEO_LIMIT", defaults.crawl_video_limit),
            cors_origins: var("CORS_ORIGINS")
                .map(|origins| split_list(&origins))
                .unwrap_or(defaults.cors_origins),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    let Ok(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };

    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
