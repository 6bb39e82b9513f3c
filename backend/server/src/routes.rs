use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    error::AppError,
    models::{FeedVideo, Order, UserProfile},
    state::AppState,
    utils::validate_id,
};

#[derive(Deserialize)]
pub struct FeedInit {
    session_id: String,
    user_id: Option<String>,
    #[serde(default)]
    order: Order,
}

#[derive(Deserialize)]
pub struct FeedNext {
    session_id: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct Page {
    #[serde(default = "default_page_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_order")]
    order: Order,
}

fn default_page_limit() -> usize {
    10
}

fn default_page_order() -> Order {
    Order::Recency
}

#[derive(Deserialize)]
pub struct UserQuery {
    user_id: String,
}

#[derive(Deserialize)]
pub struct Edge {
    user_id: String,
    channel_id: String,
}

#[derive(Deserialize)]
pub struct AddChannel {
    url: String,
    user_id: String,
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the shorts feed API" }))
}

pub async fn feed_init_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FeedInit>,
) -> Result<impl IntoResponse, AppError> {
    validate_id("session", &payload.session_id)?;

    let pool = state
        .pool
        .compose(payload.user_id.as_deref(), state.config.pool_size, payload.order)
        .await?;
    let size = pool.len();
    let ready = state.sessions.init_session(&payload.session_id, pool).await?;

    Ok(Json(json!({ "ready": ready, "size": size })))
}

pub async fn feed_next_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedNext>,
) -> Result<Json<Vec<FeedVideo>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.config.page_size)
        .min(state.config.max_page_size);

    let video_ids = state.sessions.drain(&query.session_id, limit).await?;
    debug!("Drained {} videos from {}", video_ids.len(), query.session_id);

    Ok(Json(state.catalog.resolve(&video_ids).await?))
}

pub async fn view_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let score = state.catalog.record_view(&video_id).await?;

    Ok(Json(json!({ "id": video_id, "score": score })))
}

pub async fn channels_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.list_all_channels().await?))
}

pub async fn add_channel_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddChannel>,
) -> Result<impl IntoResponse, AppError> {
    let channel_id = state
        .ingestor
        .add_channel(&payload.user_id, &payload.url)
        .await?;

    Ok(Json(json!({ "status": "success", "channel_id": channel_id })))
}

pub async fn channel_videos_handler(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<FeedVideo>>, AppError> {
    let limit = page.limit.min(state.config.max_page_size);
    let video_ids = state
        .catalog
        .list_channel_videos(&channel_id, limit, page.offset, page.order)
        .await?;

    Ok(Json(state.catalog.resolve(&video_ids).await?))
}

pub async fn resync_handler(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ingestor.request_resync(&channel_id).await?))
}

pub async fn subscriptions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    validate_id("user", &query.user_id)?;

    let channel_ids = state.subscriptions.list_subscriptions(&query.user_id).await?;

    Ok(Json(state.catalog.channels_info(&channel_ids).await?))
}

pub async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(edge): Json<Edge>,
) -> Result<impl IntoResponse, AppError> {
    state
        .subscriptions
        .subscribe(&edge.user_id, &edge.channel_id)
        .await?;

    Ok(Json(json!({ "status": "ok", "channel_deleted": false })))
}

pub async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(edge): Json<Edge>,
) -> Result<impl IntoResponse, AppError> {
    let channel_deleted = state
        .subscriptions
        .unsubscribe(&edge.user_id, &edge.channel_id)
        .await?;

    Ok(Json(json!({ "status": "ok", "channel_deleted": channel_deleted })))
}

pub async fn user_handler(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<UserProfile>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.subscriptions.upsert_user(profile).await?))
}
