//! Documentation of a short-video feed service.
//!
//! Channels are crawled, their videos ranked by a view-count fairness score, and served as
//! shuffled, de-duplicated session feeds to guests or subscribed users.
//!
//!
//!
//! # General Infrastructure
//! - Frontend talks to this server over JSON
//! - Server talks to a single Redis instance, the only shared mutable state
//! - Authentication happens upstream, handlers receive an already verified user id
//! - Crawling is scraping of public pages, see [`crawler`]
//! - A scheduled sweep resyncs every known channel once a day, see [`scheduler`]
//!
//!
//!
//! # Feed Flow
//!
//! 1. Frontend opens a tab and posts `/api/feed/init` with a fresh session id
//! 2. [`pool`] builds up to `FEED_POOL_SIZE` ids: subscribed channels ranked by views, or the
//!    global ranking for guests and users whose subscriptions have nothing yet
//! 3. [`session`] shuffles the pool into `session:{id}` with a two hour expiry
//! 4. Frontend pulls `/api/feed/next` while scrolling, each call pops the next slice
//! 5. Each watched video posts `/api/videos/{id}/view`, which feeds back into step 2
//!
//!
//!
//! # Fairness
//!
//! The default order is least viewed first. Fresh uploads start at zero views and therefore
//! surface ahead of everything already watched. Shuffling the pool keeps two tabs of the same
//! user from seeing the same sequence.
//!
//!
//!
//! # Notes
//!
//! ## Consistency
//! Single commands are atomic, multi-key writes go through `MULTI/EXEC`. Nothing spans a
//! read and a write, so a cascade delete racing an ingestion or a subscribe can leave a video
//! without a channel for a moment. Feed resolution fills in placeholders instead of failing.
//!
//! ## Cleanup
//! Channels are deleted when their last follower leaves. Scratch sets from pool building carry
//! a 60 second expiry on top of being deleted after use.
//!
//!
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! docker run -p 6379:6379 redis:7
//! RUST_LOG=info cargo run -p shorts-server
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod database;
pub mod error;
pub mod ingest;
pub mod keys;
pub mod memory;
pub mod models;
pub mod pool;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod utils;

use config::Config;
use error::AppError;
use routes::{
    add_channel_handler, channel_videos_handler, channels_handler, feed_init_handler,
    feed_next_handler, resync_handler, root_handler, subscribe_handler, subscriptions_handler,
    unsubscribe_handler, user_handler, view_handler,
};
use scheduler::spawn_resync_schedule;
use state::AppState;

pub fn init_tracing() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

pub fn app(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse()
                .map_err(|_| warn!("Ignoring malformed CORS origin {origin}"))
                .ok()
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(root_handler))
        .route("/api/feed/init", post(feed_init_handler))
        .route("/api/feed/next", get(feed_next_handler))
        .route("/api/videos/{id}/view", post(view_handler))
        .route("/api/channels", get(channels_handler).post(add_channel_handler))
        .route("/api/channels/{id}/videos", get(channel_videos_handler))
        .route("/api/channels/{id}/resync", post(resync_handler))
        .route("/api/subscriptions", get(subscriptions_handler))
        .route("/api/subscribe", post(subscribe_handler))
        .route("/api/unsubscribe", post(unsubscribe_handler))
        .route("/api/users", post(user_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), AppError> {
    init_tracing();

    info!("Initializing state...");
    let config = Config::load();
    let state = AppState::new(config).await?;

    let schedule = spawn_resync_schedule(
        state.ingestor.clone(),
        Duration::from_secs(state.config.resync_period_secs),
    );

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    schedule.abort();
    info!("Server shutting down...");

    Ok(served?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
